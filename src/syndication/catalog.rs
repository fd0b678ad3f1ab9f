use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::types::{CheckStrategy, SyndicationListing, Tier};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub tier: Tier,
    pub strategy: CheckStrategy,
    /// Search page template with `{city}`, `{state}` and `{address}` slug placeholders.
    #[serde(default)]
    pub search_url: Option<String>,
}

impl CatalogEntry {
    fn new(name: &str, tier: Tier, strategy: CheckStrategy, search_url: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            tier,
            strategy,
            search_url: search_url.map(str::to_string),
        }
    }

    /// Search page for this listing's city, or the platform's home page when no
    /// template is known.
    pub fn url_for(&self, listing: &SyndicationListing) -> String {
        match &self.search_url {
            Some(template) => template
                .replace("{city}", &slug(&listing.city))
                .replace("{state}", &slug(&listing.state))
                .replace("{address}", &slug(&listing.address)),
            None => {
                let host = self.name.to_lowercase().replace(' ', "");
                if host.contains('.') {
                    format!("https://www.{host}")
                } else {
                    format!("https://www.{host}.com")
                }
            }
        }
    }
}

/// Registry of syndication platforms. Built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyndicationCatalog {
    entries: Vec<CatalogEntry>,
}

impl SyndicationCatalog {
    /// Entry names must be unique and non-empty.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Self> {
        let mut seen = HashSet::new();
        for e in &entries {
            if e.name.trim().is_empty() {
                return Err(AppError::Config("catalog entry with empty name".to_string()));
            }
            if !seen.insert(e.name.to_lowercase()) {
                return Err(AppError::Config(format!("duplicate catalog entry: {}", e.name)));
            }
        }
        Ok(Self { entries })
    }

    /// Load a JSON array of entries. An empty array is a configuration error.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
            .map_err(|e| AppError::Config(format!("catalog {}: {e}", path.display())))
    }

    fn from_json_str(raw: &str) -> Result<Self> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(raw)?;
        let catalog = Self::from_entries(entries)?;
        if catalog.is_empty() {
            return Err(AppError::Config("no platforms listed".to_string()));
        }
        Ok(catalog)
    }

    pub fn builtin() -> Self {
        use CheckStrategy::{Manual, SearchPage};
        use Tier::{Primary, Secondary};

        let primary = [
            ("Zillow", "https://www.zillow.com/homes/{city}-{state}_rb/"),
            ("Zumper", "https://www.zumper.com/apartments-for-rent/{city}-{state}"),
            ("HotPads", "https://hotpads.com/{city}-{state}/apartments-for-rent"),
            ("Realtor.com", "https://www.realtor.com/apartments/{city}_{state}"),
            ("Redfin", "https://www.redfin.com/city/{city}/{state}/apartments-for-rent"),
            ("Trulia", "https://www.trulia.com/for_rent/{city},{state}/"),
        ];
        let secondary_searchable = [
            ("Apartments.com", "https://www.apartments.com/{city}-{state}/"),
            ("Rent.com", "https://www.rent.com/{state}/{city}"),
            ("Rentable", "https://www.rentable.co/{state}/{city}"),
        ];
        let secondary_manual = [
            "ApartmentAdvisor", "ApartmentPicks", "Call It Home", "ClaZ.org", "College House",
            "CollegePads", "Diggz", "Domu", "Listanza", "Locanto", "Mapliv", "Mitula",
            "RentalAds.com", "Rental Beast", "Rentals.com", "RentalSource", "RentDigs", "RentHop",
            "Rentler", "Trovit",
        ];

        let entries = primary
            .iter()
            .map(|(name, url)| CatalogEntry::new(name, Primary, SearchPage, Some(*url)))
            .chain(
                secondary_searchable
                    .iter()
                    .map(|(name, url)| CatalogEntry::new(name, Secondary, SearchPage, Some(*url))),
            )
            .chain(
                secondary_manual
                    .iter()
                    .map(|name| CatalogEntry::new(name, Secondary, Manual, None)),
            )
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn primary_count(&self) -> usize {
        self.entries.iter().filter(|e| e.tier == Tier::Primary).count()
    }
}

/// "San Antonio" → "san-antonio".
fn slug(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

use serde::{Deserialize, Serialize};

/// Supported language codes and their display names.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("ar", "Arabic"),
    ("de", "German"),
    ("fr", "French"),
    ("es", "Spanish"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("zh", "Chinese"),
];

/// Supported country codes and their display names.
pub const COUNTRIES: &[(&str, &str)] = &[
    ("eg", "Egypt"),
    ("us", "United States"),
    ("uk", "United Kingdom"),
    ("sa", "Saudi Arabia"),
    ("in", "India"),
    ("zz", "ZZ"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Catalog {
    Languages,
    Countries,
}

impl Catalog {
    fn entries(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Catalog::Languages => LANGUAGES,
            Catalog::Countries => COUNTRIES,
        }
    }

    /// Display name for a code. Codes are matched case-insensitively after trimming.
    pub fn name_of(self, code: &str) -> Option<&'static str> {
        let code = code.trim().to_lowercase();
        self.entries()
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, name)| *name)
    }

    pub fn codes(self) -> Vec<&'static str> {
        self.entries().iter().map(|(c, _)| *c).collect()
    }
}

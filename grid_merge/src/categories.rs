/// Unit type codes used by the day-ahead cleared offer reports.
pub const TECHNOLOGY_CODES: [(u32, &str); 27] = [
    (1, "Single Boiler"),
    (2, "Multiple Boiler"),
    (3, "Bleed Steam Unit"),
    (4, "Steam Turbine"),
    (5, "Combine Cycle ST"),
    (11, "Boiling Water Reactor"),
    (12, "Pressurized Water Reactor"),
    (21, "Industrial CT"),
    (22, "Single Engine Jet"),
    (23, "Two Engine Jet - One Expander Turbines"),
    (24, "Two Engine Jet - Two Expander Turbines"),
    (25, "Eight Engine Jet"),
    (26, "Regenerative Unit"),
    (27, "Combustion Turbine"),
    (31, "All Diesel Units"),
    (41, "Run of River"),
    (42, "Pumped Storage"),
    (51, "Combined Cycle CT"),
    (52, "Combined Cycle Aggregate"),
    (61, "Wind"),
    (71, "Other Fossil"),
    (72, "Other Peaker"),
    (86, "Steam Max Schedule"),
    (87, "DR Type1"),
    (88, "DR Type2"),
    (89, "External Resource"),
    (99, "Demand Response"),
];

/// Fuel types of the generation mix reports and their column labels.
pub const FUEL_TYPES: [(&str, &str); 6] = [
    ("COAL", "coal"),
    ("GAS", "gas"),
    ("HYDRO", "hydro"),
    ("NUCLEAR", "nuclear"),
    ("WIND", "wind"),
    ("OTHER", "other"),
];

/// Canonical label for a unit type cell. Unmapped codes come back unchanged.
pub fn technology_label(raw: &str) -> String {
    let raw = raw.trim();
    raw.parse::<f64>()
        .ok()
        .filter(|code| code.fract() == 0.0 && *code >= 0.0)
        .and_then(|code| {
            TECHNOLOGY_CODES
                .iter()
                .find(|(known, _)| f64::from(*known) == code)
                .map(|(_, label)| label.to_string())
        })
        .unwrap_or_else(|| raw.to_string())
}

pub fn fuel_label(raw: &str) -> String {
    let raw = raw.trim();
    FUEL_TYPES
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(raw))
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Ordered set of expected category labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    labels: Vec<String>,
}

impl Vocabulary {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

pub fn technology_vocabulary() -> Vocabulary {
    Vocabulary::new(TECHNOLOGY_CODES.iter().map(|(_, label)| *label))
}

pub fn fuel_vocabulary() -> Vocabulary {
    Vocabulary::new(FUEL_TYPES.iter().map(|(_, label)| *label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_technology_codes_map() {
        assert_eq!(technology_label("1"), "Single Boiler");
        assert_eq!(technology_label(" 61.0 "), "Wind");
        assert_eq!(technology_label("99"), "Demand Response");
        assert_eq!(technology_label("13"), "13");
        assert_eq!(technology_label("Battery"), "Battery");
    }

    #[test]
    fn test_fuel_labels() {
        assert_eq!(fuel_label("COAL"), "coal");
        assert_eq!(fuel_label("Nuclear"), "nuclear");
        assert_eq!(fuel_label("SOLAR"), "SOLAR");
    }

    #[test]
    fn test_vocabularies() {
        let tech = technology_vocabulary();
        assert_eq!(tech.labels().len(), 27);
        assert_eq!(tech.labels()[0], "Single Boiler");
        assert!(tech.contains("Pumped Storage"));
        assert!(!fuel_vocabulary().contains("solar"));
    }
}

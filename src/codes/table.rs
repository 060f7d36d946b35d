use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const DEFAULT_CODES: &str = include_str!("default_codes.toml");

/// Subscription plan selected by the requested number of months
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    ThreeMonths,
    SevenMonths,
}

impl Plan {
    /// 3 selects the three-month plan, anything else the seven-month plan
    pub fn for_months(months: u32) -> Self {
        if months == 3 {
            Plan::ThreeMonths
        } else {
            Plan::SevenMonths
        }
    }
}

/// Which code of a plan applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    /// No subscription yet, or the last one has lapsed
    Initial,
    /// Extending a subscription that is still running
    Renewal,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PlanCodes {
    pub initial: String,
    pub renewal: String,
}

impl PlanCodes {
    fn get(&self, kind: CodeKind) -> &str {
        match kind {
            CodeKind::Initial => &self.initial,
            CodeKind::Renewal => &self.renewal,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LetterCodes {
    pub three_months: PlanCodes,
    pub seven_months: PlanCodes,
}

impl LetterCodes {
    fn plan(&self, plan: Plan) -> &PlanCodes {
        match plan {
            Plan::ThreeMonths => &self.three_months,
            Plan::SevenMonths => &self.seven_months,
        }
    }
}

/// Static access codes, one entry per uppercase starting letter A-Z
#[derive(Debug, Clone)]
pub struct CodeTable {
    letters: HashMap<char, LetterCodes>,
}

impl CodeTable {
    /// The table compiled into the binary
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(DEFAULT_CODES).context("Built-in access code table is invalid")
    }

    /// Load the table from `path`, or fall back to the built-in table
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read access code file: {}", path.display()))?;

        Self::from_toml_str(&content)
            .context(format!("Invalid access code file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, LetterCodes> =
            toml::from_str(content).context("Failed to parse access code table")?;

        let mut letters = HashMap::with_capacity(raw.len());

        for (key, codes) in raw {
            let mut chars = key.chars();
            let letter = match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_uppercase() => c,
                _ => bail!("Invalid table key '{}': expected a single letter A-Z", key),
            };

            let plans = [
                ("three_months", &codes.three_months),
                ("seven_months", &codes.seven_months),
            ];
            for (plan, plan_codes) in plans {
                if plan_codes.initial.is_empty() || plan_codes.renewal.is_empty() {
                    bail!("Empty code for letter {} plan {}", letter, plan);
                }
            }

            letters.insert(letter, codes);
        }

        let missing: String = ('A'..='Z').filter(|c| !letters.contains_key(c)).collect();
        if !missing.is_empty() {
            bail!("Access code table is missing letters: {}", missing);
        }

        Ok(Self { letters })
    }

    /// Codes for the given starting letter, case-insensitive
    pub fn letter(&self, letter: char) -> Option<&LetterCodes> {
        self.letters.get(&letter.to_ascii_uppercase())
    }

    /// The code a user must present, or None if the letter has no entry
    pub fn expected_code(&self, letter: char, plan: Plan, kind: CodeKind) -> Option<&str> {
        self.letter(letter).map(|codes| codes.plan(plan).get(kind))
    }

    pub fn len(&self) -> usize {
        self.letters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_covers_alphabet() {
        let table = CodeTable::builtin().unwrap();
        assert_eq!(table.len(), 26);
        for letter in 'A'..='Z' {
            assert!(table.letter(letter).is_some(), "missing {}", letter);
        }
    }

    #[test]
    fn test_builtin_table_known_entries() {
        let table = CodeTable::builtin().unwrap();

        assert_eq!(table.expected_code('A', Plan::ThreeMonths, CodeKind::Initial), Some("222978"));
        assert_eq!(table.expected_code('A', Plan::ThreeMonths, CodeKind::Renewal), Some("000000"));
        assert_eq!(table.expected_code('A', Plan::SevenMonths, CodeKind::Initial), Some("111000"));
        assert_eq!(table.expected_code('A', Plan::SevenMonths, CodeKind::Renewal), Some("300000"));

        assert_eq!(table.expected_code('B', Plan::ThreeMonths, CodeKind::Initial), Some("222496"));
        assert_eq!(table.expected_code('B', Plan::ThreeMonths, CodeKind::Renewal), Some("111111"));
        assert_eq!(table.expected_code('B', Plan::SevenMonths, CodeKind::Initial), Some("111001"));
        assert_eq!(table.expected_code('B', Plan::SevenMonths, CodeKind::Renewal), Some("310000"));

        assert_eq!(table.expected_code('K', Plan::ThreeMonths, CodeKind::Renewal), Some("100000"));
        assert_eq!(table.expected_code('Z', Plan::ThreeMonths, CodeKind::Initial), Some("222133"));
        assert_eq!(table.expected_code('Z', Plan::SevenMonths, CodeKind::Renewal), Some("550000"));
    }

    #[test]
    fn test_builtin_table_sequences() {
        // Three-month initial codes run 222110.. from C, seven-month initial 111000.. from A
        let table = CodeTable::builtin().unwrap();
        for (i, letter) in ('C'..='Z').enumerate() {
            let expected = format!("{}", 222110 + i);
            assert_eq!(
                table.expected_code(letter, Plan::ThreeMonths, CodeKind::Initial),
                Some(expected.as_str())
            );
        }
        for (i, letter) in ('A'..='Z').enumerate() {
            let expected = format!("{}", 111000 + i);
            assert_eq!(
                table.expected_code(letter, Plan::SevenMonths, CodeKind::Initial),
                Some(expected.as_str())
            );
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = CodeTable::builtin().unwrap();
        assert_eq!(
            table.expected_code('a', Plan::ThreeMonths, CodeKind::Initial),
            table.expected_code('A', Plan::ThreeMonths, CodeKind::Initial)
        );
    }

    #[test]
    fn test_lookup_non_letter() {
        let table = CodeTable::builtin().unwrap();
        assert!(table.expected_code('1', Plan::ThreeMonths, CodeKind::Initial).is_none());
        assert!(table.expected_code('_', Plan::SevenMonths, CodeKind::Renewal).is_none());
        assert!(table.expected_code('é', Plan::SevenMonths, CodeKind::Renewal).is_none());
    }

    #[test]
    fn test_plan_for_months() {
        assert_eq!(Plan::for_months(3), Plan::ThreeMonths);
        assert_eq!(Plan::for_months(7), Plan::SevenMonths);
        assert_eq!(Plan::for_months(1), Plan::SevenMonths);
        assert_eq!(Plan::for_months(12), Plan::SevenMonths);
    }

    #[test]
    fn test_incomplete_table_rejected() {
        let content = r#"
[A]
three_months = { initial = "1", renewal = "2" }
seven_months = { initial = "3", renewal = "4" }
"#;
        let err = CodeTable::from_toml_str(content).unwrap_err();
        assert!(format!("{:#}", err).contains("missing letters"));
    }

    #[test]
    fn test_bad_key_rejected() {
        let mut content = DEFAULT_CODES.to_string();
        content.push_str(concat!(
            "\n[AB]\n",
            "three_months = { initial = \"1\", renewal = \"2\" }\n",
            "seven_months = { initial = \"3\", renewal = \"4\" }\n",
        ));
        assert!(CodeTable::from_toml_str(&content).is_err());

        let lower = DEFAULT_CODES.replace("[A]", "[a]");
        assert!(CodeTable::from_toml_str(&lower).is_err());
    }

    #[test]
    fn test_empty_code_rejected() {
        let content = DEFAULT_CODES.replace("initial = \"222978\"", "initial = \"\"");
        assert!(CodeTable::from_toml_str(&content).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("codes.toml");
        let custom = DEFAULT_CODES.replace("\"222978\"", "\"999999\"");
        std::fs::write(&path, custom).unwrap();

        let table = CodeTable::load(Some(&path)).unwrap();
        assert_eq!(table.expected_code('A', Plan::ThreeMonths, CodeKind::Initial), Some("999999"));

        assert!(CodeTable::load(Some(&temp_dir.path().join("absent.toml"))).is_err());
        assert_eq!(CodeTable::load(None).unwrap().len(), 26);
    }
}

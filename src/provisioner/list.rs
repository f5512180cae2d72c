//! Normalised parsing of backend cluster listings

use serde::Deserialize;

/// Shape of a backend's list output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFormat<'a> {
    /// JSON array of objects with a `name` field
    Json,
    /// One name per line; `sentinel` marks an empty listing
    Lines { sentinel: &'a str },
}

#[derive(Deserialize)]
struct ListEntry {
    #[serde(default)]
    name: String,
}

/// Extract cluster names from raw list output, preserving order
pub fn parse_list(format: ListFormat<'_>, raw: &str) -> Result<Vec<String>, serde_json::Error> {
    match format {
        ListFormat::Json => {
            let raw = raw.trim();
            if raw.is_empty() {
                return Ok(Vec::new());
            }
            let entries: Vec<ListEntry> = serde_json::from_str(raw)?;
            Ok(entries
                .into_iter()
                .map(|entry| entry.name)
                .filter(|name| !name.is_empty())
                .collect())
        }
        ListFormat::Lines { sentinel } => Ok(raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && *line != sentinel)
            .map(String::from)
            .collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_drops_empty_names() {
        let raw = r#"[{"name":"alpha","servers":1},{"name":""},{"agents":2},{"name":"beta"}]"#;
        assert_eq!(parse_list(ListFormat::Json, raw).unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_json_empty_output() {
        assert!(parse_list(ListFormat::Json, "  \n").unwrap().is_empty());
        assert!(parse_list(ListFormat::Json, "[]").unwrap().is_empty());
    }

    #[test]
    fn test_json_rejects_garbage() {
        assert!(parse_list(ListFormat::Json, "not json").is_err());
    }

    #[test]
    fn test_lines_filters_sentinel() {
        let format = ListFormat::Lines {
            sentinel: "No kind clusters found.",
        };
        let raw = "alpha\n\nNo kind clusters found.\n  beta  \n";
        assert_eq!(parse_list(format, raw).unwrap(), vec!["alpha", "beta"]);
        assert!(parse_list(format, "No kind clusters found.\n").unwrap().is_empty());
    }
}

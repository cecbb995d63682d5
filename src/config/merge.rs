//! Layer merging
//!
//! - Tables: merged key by key, recursively
//! - Arrays and scalars: the later layer replaces the earlier value

/// Merge `overlay` into `base`
pub fn merge_tables(mut base: toml::Table, overlay: toml::Table) -> toml::Table {
    for (key, overlay_value) in overlay {
        let merged = match (base.remove(&key), overlay_value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                toml::Value::Table(merge_tables(base_table, overlay_table))
            }
            (_, overlay_value) => overlay_value,
        };
        base.insert(key, merged);
    }
    base
}

/// Merge layers in order; the last layer has the highest precedence
pub fn merge_layers(layers: Vec<toml::Table>) -> toml::Table {
    layers.into_iter().fold(toml::Table::new(), merge_tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(s: &str) -> toml::Table {
        s.parse().unwrap()
    }

    #[test]
    fn test_nested_table_merge_keeps_siblings() {
        let base = table("[expiration]\nbins = 1\nsnapshot = 1\n");
        let overlay = table("[expiration]\nbins = 7\n");

        let merged = merge_tables(base, overlay);
        assert_eq!(merged["expiration"]["bins"].as_integer(), Some(7));
        assert_eq!(merged["expiration"]["snapshot"].as_integer(), Some(1));
    }

    #[test]
    fn test_scalar_replaces_table() {
        let base = table("[storage]\nmetadata_dir = \"a\"\n");
        let overlay = table("storage = 3\n");

        let merged = merge_tables(base, overlay);
        assert_eq!(merged["storage"].as_integer(), Some(3));
    }

    #[test]
    fn test_layer_precedence() {
        let builtin = table("hours_before_expire = 1\nenforce_threshold = false\n");
        let file = table("hours_before_expire = 2\n");
        let env = table("enforce_threshold = true\n");
        let cli = table("hours_before_expire = 3\n");

        let merged = merge_layers(vec![builtin, file, env, cli]);
        assert_eq!(merged["hours_before_expire"].as_integer(), Some(3));
        assert_eq!(merged["enforce_threshold"].as_bool(), Some(true));
    }
}

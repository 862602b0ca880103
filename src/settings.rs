use serde::Deserialize;

/// Rendering (unparse) options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Prefix for aliases generated for anonymous from-elements
    pub alias_prefix: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            alias_prefix: "alias_".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CteSettings {
    /// Prefix for names generated by the unnamed `with` overloads
    pub auto_name_prefix: String,
}

impl Default for CteSettings {
    fn default() -> Self {
        Self {
            auto_name_prefix: "var_".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TreeSettings {
    pub render: RenderSettings,
    pub cte: CteSettings,
    pub cache: CacheSettings,
}

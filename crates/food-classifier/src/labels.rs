//! Class label table

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::ClassifierError;

/// Food-101 category names, in model index order
const FOOD_101: [&str; 101] = [
    "apple_pie", "baby_back_ribs", "baklava", "beef_carpaccio", "beef_tartare",
    "beet_salad", "beignets", "bibimbap", "bread_pudding", "breakfast_burrito",
    "bruschetta", "caesar_salad", "cannoli", "caprese_salad", "carrot_cake",
    "ceviche", "cheesecake", "cheese_plate", "chicken_curry", "chicken_quesadilla",
    "chicken_wings", "chocolate_cake", "chocolate_mousse", "churros", "clam_chowder",
    "club_sandwich", "crab_cakes", "creme_brulee", "croque_madame", "cup_cakes",
    "deviled_eggs", "donuts", "dumplings", "edamame", "eggs_benedict",
    "escargots", "falafel", "filet_mignon", "fish_and_chips", "foie_gras",
    "french_fries", "french_onion_soup", "french_toast", "fried_calamari", "fried_chicken",
    "frozen_yogurt", "garlic_bread", "gnocchi", "greek_salad", "grilled_cheese_sandwich",
    "grilled_salmon", "guacamole", "gyoza", "hamburger", "hot_and_sour_soup",
    "hot_dog", "huevos_rancheros", "hummus", "ice_cream", "lasagna",
    "lobster_bisque", "lobster_roll_sandwich", "macaroni_and_cheese", "macarons", "miso_soup",
    "mussels", "nachos", "omelette", "onion_rings", "oysters",
    "pad_thai", "paella", "pancakes", "panna_cotta", "peking_duck",
    "pho", "pizza", "pork_chop", "poutine", "prime_rib",
    "pulled_pork_sandwich", "ramen", "ravioli", "red_velvet_cake", "risotto",
    "samosa", "sashimi", "scallops", "seaweed_salad", "shrimp_and_grits",
    "spaghetti_bolognese", "spaghetti_carbonara", "spring_rolls", "steak", "strawberry_shortcake",
    "sushi", "tacos", "takoyaki", "tiramisu", "tuna_tartare",
    "waffles",
];

/// Subset of a pretrained model's `config.json` we care about
#[derive(Debug, Deserialize)]
struct ModelConfigFile {
    #[serde(default)]
    id2label: HashMap<String, String>,
}

/// Immutable mapping from class index to human-readable name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: BTreeMap<usize, String>,
}

impl LabelTable {
    /// Build a table from names listed in index order
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: names
                .into_iter()
                .enumerate()
                .map(|(idx, name)| (idx, name.into()))
                .collect(),
        }
    }

    /// The 101 Food-101 categories
    pub fn food101() -> Self {
        Self::from_names(FOOD_101)
    }

    /// Parse the `id2label` map of a model `config.json` document.
    ///
    /// Returns `Ok(None)` when the document carries no label map.
    pub fn from_config_json(json: &str) -> Result<Option<Self>, ClassifierError> {
        let config: ModelConfigFile = serde_json::from_str(json)
            .map_err(|e| ClassifierError::ModelLoad(format!("invalid config.json: {}", e)))?;

        if config.id2label.is_empty() {
            return Ok(None);
        }

        let mut labels = BTreeMap::new();
        for (key, name) in config.id2label {
            let idx = key.trim().parse::<usize>().map_err(|_| {
                ClassifierError::ModelLoad(format!("invalid id2label key '{}'", key))
            })?;
            labels.insert(idx, name);
        }

        Ok(Some(Self { labels }))
    }

    /// Load labels from `<model_dir>/config.json`, falling back to Food-101
    pub fn load(model_dir: &Path) -> Result<Self, ClassifierError> {
        let path = model_dir.join("config.json");
        if !path.is_file() {
            warn!("No config.json in {}, using built-in Food-101 labels", model_dir.display());
            return Ok(Self::food101());
        }

        let json = std::fs::read_to_string(&path)
            .map_err(|e| ClassifierError::ModelLoad(format!("{}: {}", path.display(), e)))?;

        match Self::from_config_json(&json)? {
            Some(table) => {
                debug!("Loaded {} labels from {}", table.len(), path.display());
                Ok(table)
            }
            None => {
                warn!("{} has no id2label map, using built-in Food-101 labels", path.display());
                Ok(Self::food101())
            }
        }
    }

    /// Look up a label by index
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.labels.get(&idx).map(String::as_str)
    }

    /// Label for `idx`, or `Unknown_<idx>` when the table has no entry
    pub fn name_or_unknown(&self, idx: usize) -> String {
        match self.get(idx) {
            Some(name) => name.to_string(),
            None => format!("Unknown_{}", idx),
        }
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::food101()
    }
}

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Number of scripts pinned to the quick-access panel.
pub const QUICK_ACCESS_LEN: usize = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ClientType,
    Product,
    SalesStage,
}

impl Category {
    /// Display order used when grouping.
    pub const ALL: [Category; 3] = [Category::ClientType, Category::Product, Category::SalesStage];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientType => write!(f, "Тип клієнта"),
            Self::Product => write!(f, "Продукт"),
            Self::SalesStage => write!(f, "Етап продажу"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub id: String,
    pub label: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Script {
    pub id: String,
    pub title: String,
    pub category: Category,
    #[serde(default)]
    pub tags: Vec<String>,
    pub steps: Vec<Step>,
}

impl Script {
    /// Case-insensitive substring match against the title or any tag.
    pub fn matches(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let query = query.to_lowercase();
        self.title.to_lowercase().contains(&query)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&query))
    }

    pub fn last_step_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    scripts: Vec<Script>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    scripts: Vec<Script>,
}

impl Catalog {
    pub fn new(scripts: Vec<Script>) -> Result<Self> {
        let mut ids = HashSet::new();
        for script in &scripts {
            if !ids.insert(script.id.as_str()) {
                bail!("Duplicate script id: {}", script.id);
            }
            if script.steps.is_empty() {
                bail!("Script '{}' has no steps", script.id);
            }
            let mut step_ids = HashSet::new();
            for step in &script.steps {
                if !step_ids.insert(step.id.as_str()) {
                    bail!("Duplicate step id '{}' in script '{}'", step.id, script.id);
                }
            }
        }
        Ok(Self { scripts })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: CatalogFile =
            serde_yaml_ng::from_str(content).context("Failed to parse script catalog")?;
        Self::new(file.scripts)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let catalog = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid catalog {}", path.display()))?;
        log::info!("Loaded {} scripts from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn list(&self) -> &[Script] {
        &self.scripts
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Position of the script with `id` in catalog order.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.scripts.iter().position(|s| s.id == id)
    }

    pub fn filter(&self, query: &str) -> Vec<&Script> {
        self.scripts.iter().filter(|s| s.matches(query)).collect()
    }

    pub fn quick_access(&self) -> &[Script] {
        &self.scripts[..self.scripts.len().min(QUICK_ACCESS_LEN)]
    }

    /// Filtered scripts partitioned by category. Empty groups are omitted and
    /// catalog order is kept inside each group.
    pub fn grouped(&self, query: &str) -> Vec<(Category, Vec<&Script>)> {
        let filtered = self.filter(query);
        Category::ALL
            .iter()
            .filter_map(|cat| {
                let items: Vec<&Script> =
                    filtered.iter().copied().filter(|s| s.category == *cat).collect();
                (!items.is_empty()).then_some((*cat, items))
            })
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self { scripts: seed_scripts() }
    }
}

fn step(id: &str, label: &str, content: &str, hint: &str) -> Step {
    Step {
        id: id.to_string(),
        label: label.to_string(),
        content: content.to_string(),
        hint: Some(hint.to_string()),
    }
}

fn seed_scripts() -> Vec<Script> {
    vec![
        Script {
            id: "1".to_string(),
            title: "Холодний дзвінок (B2B)".to_string(),
            category: Category::SalesStage,
            tags: vec!["Холодний".into(), "B2B".into(), "Перший контакт".into()],
            steps: vec![
                step(
                    "1-1",
                    "Привітання",
                    "Добрий день! Мене звати [Ім’я], компанія SalesFlow. Я телефоную, щоб запропонувати рішення для вашої команди продажів...",
                    "Говоріть впевнено, не робіть довгих пауз.",
                ),
                step(
                    "1-2",
                    "Кваліфікація",
                    "Скажіть, будь ласка, скільки менеджерів зараз працює у вашому відділі? Як ви зараз контролюєте виконання скриптів?",
                    "Слухайте уважно, не перебивайте.",
                ),
                step(
                    "1-3",
                    "Призначення зустрічі",
                    "Пропоную провести коротку 15-хвилинну демонстрацію у вівторок або середу. Який час вам зручніший?",
                    "Пропонуйте два варіанти на вибір (техніка вибору без вибору).",
                ),
            ],
        },
        Script {
            id: "2".to_string(),
            title: "Презентація продукту Pro".to_string(),
            category: Category::Product,
            tags: vec!["Презентація".into(), "Pro".into(), "Демо".into()],
            steps: vec![
                step(
                    "2-1",
                    "Проблема",
                    "Більшість компаній втрачають до 30% лідів через те, що менеджери забувають ключові аргументи під час розмови...",
                    "Акцентуйте на болю клієнта.",
                ),
                step(
                    "2-2",
                    "Рішення",
                    "Наш інструмент дозволяє миттєво адаптуватися до реакції клієнта. Ви бачите підказки прямо перед очима.",
                    "Покажіть вигоду, а не лише функцію.",
                ),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(id: &str, title: &str, category: Category, tags: &[&str]) -> Script {
        Script {
            id: id.to_string(),
            title: title.to_string(),
            category,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            steps: vec![step(&format!("{id}-1"), "Step", "Content", "Hint")],
        }
    }

    fn sample() -> Catalog {
        Catalog::new(vec![
            script("a", "Cold call", Category::SalesStage, &["B2B", "first"]),
            script("b", "Retail buyer", Category::ClientType, &["b2c"]),
            script("c", "Pro demo", Category::Product, &["Demo"]),
            script("d", "Follow-up", Category::SalesStage, &["b2b"]),
            script("e", "Enterprise", Category::ClientType, &[]),
        ])
        .unwrap()
    }

    #[test]
    fn test_empty_query_returns_everything_in_order() {
        let catalog = sample();
        let ids: Vec<&str> = catalog.filter("").iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_filter_is_case_insensitive_on_tags_and_title() {
        let catalog = sample();
        let ids: Vec<&str> = catalog.filter("b2b").iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);

        let ids: Vec<&str> = catalog.filter("COLD").iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_filter_without_match_is_empty() {
        assert!(sample().filter("nothing like this").is_empty());
    }

    #[test]
    fn test_filter_seed_catalog_cyrillic() {
        let catalog = Catalog::default();
        let ids: Vec<&str> = catalog.filter("демо").iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["2"]);
    }

    #[test]
    fn test_grouping_omits_empty_categories() {
        let catalog = sample();
        let groups = catalog.grouped("b2b");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, Category::SalesStage);
        let ids: Vec<&str> = groups[0].1.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);

        let all = catalog.grouped("");
        let cats: Vec<Category> = all.iter().map(|(c, _)| *c).collect();
        assert_eq!(cats, Category::ALL.to_vec());
        let client_ids: Vec<&str> = all[0].1.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(client_ids, vec!["b", "e"]);
    }

    #[test]
    fn test_quick_access_takes_first_four() {
        let catalog = sample();
        let ids: Vec<&str> = catalog.quick_access().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(Catalog::default().quick_access().len(), 2);
    }

    #[test]
    fn test_rejects_invalid_catalogs() {
        let mut empty = script("x", "X", Category::Product, &[]);
        empty.steps.clear();
        assert!(Catalog::new(vec![empty]).is_err());

        let dup = vec![
            script("x", "X", Category::Product, &[]),
            script("x", "Y", Category::Product, &[]),
        ];
        assert!(Catalog::new(dup).is_err());

        let mut dup_steps = script("x", "X", Category::Product, &[]);
        dup_steps.steps.push(dup_steps.steps[0].clone());
        assert!(Catalog::new(vec![dup_steps]).is_err());
    }

    #[test]
    fn test_yaml_catalog() -> Result<()> {
        let yaml = r#"
scripts:
  - id: objection
    title: Price objection
    category: sales_stage
    tags: [price]
    steps:
      - id: o-1
        label: Acknowledge
        content: I understand the budget concern.
      - id: o-2
        label: Reframe
        content: Let's look at the cost of lost leads.
        hint: Use numbers.
"#;
        let catalog = Catalog::from_yaml_str(yaml)?;
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.index_of("objection"), Some(0));
        assert_eq!(catalog.index_of("missing"), None);
        let script = &catalog.list()[0];
        assert_eq!(script.category, Category::SalesStage);
        assert_eq!(script.steps[0].hint, None);
        assert_eq!(script.steps[1].hint.as_deref(), Some("Use numbers."));
        assert_eq!(script.last_step_index(), 1);
        Ok(())
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("scripts.yml");
        std::fs::write(&path, "scripts:\n  - id: s\n    title: T\n    category: product\n    steps: []\n")?;

        let err = Catalog::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("has no steps"));
        Ok(())
    }
}

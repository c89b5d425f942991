use serde::{Deserialize, Serialize};

/// The three practice disciplines. The set is fixed at compile time;
/// categories are never created or destroyed at runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Technique,
    Etude,
    Repertoire,
}

/// How often a goal for a category rolls over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GoalCycle {
    Weekly,
    Monthly,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Technique, Category::Etude, Category::Repertoire];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Technique => "technique",
            Category::Etude => "etude",
            Category::Repertoire => "repertoire",
        }
    }

    pub fn from_str(value: &str) -> Option<Category> {
        match value {
            "technique" => Some(Category::Technique),
            "etude" => Some(Category::Etude),
            "repertoire" => Some(Category::Repertoire),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Technique => "Technique",
            Category::Etude => "Etude",
            Category::Repertoire => "Repertoire",
        }
    }

    /// Repertoire goals are set per month; the drill categories roll weekly.
    pub fn goal_cycle(&self) -> GoalCycle {
        match self {
            Category::Technique | Category::Etude => GoalCycle::Weekly,
            Category::Repertoire => GoalCycle::Monthly,
        }
    }

    /// Default session target in seconds.
    pub fn default_target_secs(&self) -> u64 {
        match self {
            Category::Technique => 600,
            Category::Etude => 1200,
            Category::Repertoire => 1200,
        }
    }
}

/// One value per category. Used for elapsed seconds, targets, alarm
/// latches and persisted minutes alike.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PerCategory<T> {
    pub technique: T,
    pub etude: T,
    pub repertoire: T,
}

impl<T> PerCategory<T> {
    pub fn get(&self, category: Category) -> &T {
        match category {
            Category::Technique => &self.technique,
            Category::Etude => &self.etude,
            Category::Repertoire => &self.repertoire,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut T {
        match category {
            Category::Technique => &mut self.technique,
            Category::Etude => &mut self.etude,
            Category::Repertoire => &mut self.repertoire,
        }
    }

    pub fn set(&mut self, category: Category, value: T) {
        *self.get_mut(category) = value;
    }

    pub fn from_fn(mut f: impl FnMut(Category) -> T) -> Self {
        Self {
            technique: f(Category::Technique),
            etude: f(Category::Etude),
            repertoire: f(Category::Repertoire),
        }
    }
}

impl<T: Copy> PerCategory<T> {
    pub fn fill(value: T) -> Self {
        Self {
            technique: value,
            etude: value,
            repertoire: value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_str() {
        for category in Category::ALL {
            assert_eq!(Category::from_str(category.as_str()), Some(category));
        }
        assert_eq!(Category::from_str("scales"), None);
    }

    #[test]
    fn per_category_indexing() {
        let mut map = PerCategory::fill(0u64);
        map.set(Category::Etude, 42);
        assert_eq!(*map.get(Category::Etude), 42);
        assert_eq!(*map.get(Category::Technique), 0);

        let doubled = PerCategory::from_fn(|c| map.get(c) * 2);
        assert_eq!(doubled.etude, 84);
    }
}

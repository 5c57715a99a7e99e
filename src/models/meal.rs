use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Image shown for meals added without one.
pub const DEFAULT_MEAL_IMAGE: &str =
    "https://images.unsplash.com/photo-1546833999-b9f581a1996d?w=400&h=300&fit=crop&auto=format";

/// Identifier of a meal in the library.
///
/// Older records carry numeric ids (creation time in epoch milliseconds);
/// ids are compared by value, so `Int(7)` and `Text("7")` are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MealId {
    Int(i64),
    Text(String),
}

impl fmt::Display for MealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MealId::Int(id) => write!(f, "{}", id),
            MealId::Text(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for MealId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Meal id cannot be empty".to_string());
        }
        match s.parse::<i64>() {
            Ok(id) => Ok(MealId::Int(id)),
            Err(_) => Ok(MealId::Text(s.to_string())),
        }
    }
}

impl From<i64> for MealId {
    fn from(id: i64) -> Self {
        MealId::Int(id)
    }
}

impl From<&str> for MealId {
    fn from(id: &str) -> Self {
        MealId::Text(id.to_string())
    }
}

/// A meal in the household library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub id: MealId,
    pub name: String,
    pub ingredients: Vec<String>,
    pub image: String,
}

impl Meal {
    /// Creates a meal with a fresh time-based id and the default image.
    pub fn new(name: impl Into<String>, ingredients: Vec<String>) -> Self {
        Self {
            id: MealId::Int(Utc::now().timestamp_millis()),
            name: name.into(),
            ingredients,
            image: DEFAULT_MEAL_IMAGE.to_string(),
        }
    }

    pub fn with_id(mut self, id: impl Into<MealId>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the image URL. Blank URLs keep the default image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        let image = image.into();
        if !image.trim().is_empty() {
            self.image = image.trim().to_string();
        }
        self
    }
}

/// Splits comma-separated ingredient input into trimmed, non-empty entries.
pub fn parse_ingredients(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl fmt::Display for Meal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "=".repeat(self.name.chars().count()))?;
        writeln!(f, "ID: {}", self.id)?;
        writeln!(f, "Image: {}", self.image)?;

        if !self.ingredients.is_empty() {
            writeln!(f, "\nIngredients:")?;
            for ingredient in &self.ingredients {
                writeln!(f, "  - {}", ingredient)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meal_new_uses_default_image() {
        let meal = Meal::new("Tacos", vec!["tortillas".to_string()]);
        assert_eq!(meal.name, "Tacos");
        assert_eq!(meal.image, DEFAULT_MEAL_IMAGE);
        assert!(matches!(meal.id, MealId::Int(_)));
    }

    #[test]
    fn test_with_image_ignores_blank() {
        let meal = Meal::new("Soup", vec![]).with_image("   ");
        assert_eq!(meal.image, DEFAULT_MEAL_IMAGE);

        let meal = Meal::new("Soup", vec![]).with_image(" https://example.com/soup.jpg ");
        assert_eq!(meal.image, "https://example.com/soup.jpg");
    }

    #[test]
    fn test_parse_ingredients() {
        assert_eq!(
            parse_ingredients("rice, beans ,, salsa "),
            vec!["rice", "beans", "salsa"]
        );
        assert!(parse_ingredients("").is_empty());
    }

    #[test]
    fn test_meal_id_from_str() {
        assert_eq!(MealId::from_str("42").unwrap(), MealId::Int(42));
        assert_eq!(
            MealId::from_str("abc-1").unwrap(),
            MealId::Text("abc-1".to_string())
        );
        assert!(MealId::from_str("  ").is_err());
    }

    #[test]
    fn test_meal_id_serializes_untagged() {
        assert_eq!(serde_json::to_string(&MealId::Int(7)).unwrap(), "7");
        assert_eq!(
            serde_json::to_string(&MealId::Text("x".to_string())).unwrap(),
            "\"x\""
        );
        let parsed: MealId = serde_json::from_str("1700000000000").unwrap();
        assert_eq!(parsed, MealId::Int(1_700_000_000_000));
    }

    #[test]
    fn test_meal_display() {
        let meal = Meal::new("Pasta", vec!["noodles".to_string()]).with_id(3);
        let output = format!("{}", meal);
        assert!(output.contains("Pasta"));
        assert!(output.contains("ID: 3"));
        assert!(output.contains("- noodles"));
    }
}

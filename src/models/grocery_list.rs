use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;

use super::meal::Meal;
use super::weekly_plan::WeeklyPlan;

/// Monday through Sunday of the week containing `today`.
pub fn current_week_dates(today: NaiveDate) -> [NaiveDate; 7] {
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    std::array::from_fn(|i| monday + Duration::days(i as i64))
}

/// Header label for the week, e.g. "Week of Jan 6 - Jan 12".
pub fn week_range_label(today: NaiveDate) -> String {
    let dates = current_week_dates(today);
    format!(
        "Week of {} - {}",
        dates[0].format("%b %-d"),
        dates[6].format("%b %-d")
    )
}

/// Shopping list derived from the meals planned for the week.
#[derive(Debug, Clone, PartialEq)]
pub struct GroceryList {
    pub week_start: NaiveDate,
    /// Distinct planned meals (by name) in day order.
    pub meals: Vec<Meal>,
    /// Normalized ingredient -> number of planned days using it.
    pub ingredients: BTreeMap<String, usize>,
}

impl GroceryList {
    /// Builds the list, or `None` when nothing is planned.
    pub fn from_plan(plan: &WeeklyPlan, today: NaiveDate) -> Option<Self> {
        if plan.is_empty() {
            return None;
        }

        let mut meals: Vec<Meal> = Vec::new();
        let mut ingredients = BTreeMap::new();

        for (_, meal) in plan.iter() {
            let Some(meal) = meal else { continue };
            if !meals.iter().any(|existing| existing.name == meal.name) {
                meals.push(meal.clone());
            }
            for ingredient in &meal.ingredients {
                let clean = ingredient.trim().to_lowercase();
                if clean.is_empty() {
                    continue;
                }
                *ingredients.entry(clean).or_insert(0) += 1;
            }
        }

        Some(Self {
            week_start: current_week_dates(today)[0],
            meals,
            ingredients,
        })
    }

    /// Suggested filename when exporting the list.
    pub fn filename(&self) -> String {
        format!("Week-of-{}-Groceries.txt", self.week_start.format("%m-%d"))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl fmt::Display for GroceryList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Week of {} Groceries", self.week_start.format("%m/%d"))?;
        writeln!(f)?;

        if !self.meals.is_empty() {
            writeln!(f, "Meals This Week")?;
            for meal in &self.meals {
                writeln!(f, "☐ {}", meal.name)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "Shopping List")?;
        for ingredient in self.ingredients.keys() {
            writeln!(f, "{}", capitalize(ingredient))?;
        }

        Ok(())
    }
}

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::meal::{Meal, MealId};
use super::weekly_plan::{Day, WeeklyPlan};

/// The meal library and weekly plan, synchronized as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub meals: Vec<Meal>,
    pub weekly_plan: WeeklyPlan,
}

impl Snapshot {
    pub fn new(meals: Vec<Meal>, weekly_plan: WeeklyPlan) -> Self {
        Self { meals, weekly_plan }
    }

    pub fn find_meal(&self, id: &MealId) -> Option<&Meal> {
        self.meals.iter().find(|meal| &meal.id == id)
    }

    /// Appends a meal to the library. Returns false if the id is taken.
    pub fn add_meal(&mut self, meal: Meal) -> bool {
        if self.find_meal(&meal.id).is_some() {
            return false;
        }
        self.meals.push(meal);
        true
    }

    /// Removes a meal from the library and clears every day that referenced it.
    pub fn delete_meal(&mut self, id: &MealId) -> Option<(Meal, Vec<Day>)> {
        let index = self.meals.iter().position(|meal| &meal.id == id)?;
        let meal = self.meals.remove(index);
        let cleared = self.weekly_plan.clear_meal(id);
        Some((meal, cleared))
    }

    /// Assigns a copy of the library meal `id` to `day`.
    pub fn assign_meal(&mut self, day: Day, id: &MealId) -> Option<&Meal> {
        let meal = self.find_meal(id)?.clone();
        self.weekly_plan.assign(day, meal);
        self.weekly_plan.get(day)
    }

    /// Fills every day with a random library meal; repeats are allowed.
    pub fn randomize_plan<R: Rng>(&mut self, rng: &mut R) {
        let mut plan = WeeklyPlan::new();
        if !self.meals.is_empty() {
            for day in Day::ALL {
                let index = rng.random_range(0..self.meals.len());
                plan.assign(day, self.meals[index].clone());
            }
        }
        self.weekly_plan = plan;
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "meals": self.meals,
            "weeklyPlan": self.weekly_plan,
        })
    }
}

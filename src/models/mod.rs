mod grocery_list;
mod meal;
mod snapshot;
mod weekly_plan;

pub use grocery_list::{current_week_dates, week_range_label, GroceryList};
pub use meal::{parse_ingredients, Meal, MealId, DEFAULT_MEAL_IMAGE};
pub use snapshot::Snapshot;
pub use weekly_plan::{Day, WeeklyPlan};

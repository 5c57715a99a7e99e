use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::meal::{Meal, MealId};

/// Day of the planning week, Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    /// All days in calendar order.
    pub const ALL: [Day; 7] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
        Day::Sunday,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
            Day::Sunday => "Sunday",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Day {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Day::ALL
            .into_iter()
            .find(|day| {
                let name = day.name().to_lowercase();
                name == lower || (lower.len() >= 3 && name.starts_with(&lower))
            })
            .ok_or_else(|| {
                format!(
                    "Invalid day '{}'. Valid options: monday, tuesday, wednesday, thursday, friday, saturday, sunday",
                    s
                )
            })
    }
}

/// Meals assigned to each day of the week.
///
/// Always holds exactly seven slots; an unassigned day is `None` and is
/// serialized as `null` rather than omitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeeklyPlan {
    slots: [Option<Meal>; 7],
}

impl WeeklyPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, day: Day) -> Option<&Meal> {
        self.slots[day.index()].as_ref()
    }

    /// Assigns a copy of `meal` to `day`, returning the previous assignment.
    pub fn assign(&mut self, day: Day, meal: Meal) -> Option<Meal> {
        self.slots[day.index()].replace(meal)
    }

    pub fn clear_day(&mut self, day: Day) -> Option<Meal> {
        self.slots[day.index()].take()
    }

    pub fn clear_all(&mut self) {
        self.slots = Default::default();
    }

    /// Empties every day holding the meal with `id`. Returns the cleared days.
    pub fn clear_meal(&mut self, id: &MealId) -> Vec<Day> {
        let mut cleared = Vec::new();
        for day in Day::ALL {
            let slot = &mut self.slots[day.index()];
            if slot.as_ref().is_some_and(|meal| &meal.id == id) {
                *slot = None;
                cleared.push(day);
            }
        }
        cleared
    }

    /// Iterates over all seven days in calendar order.
    pub fn iter(&self) -> impl Iterator<Item = (Day, Option<&Meal>)> + '_ {
        Day::ALL.into_iter().map(move |day| (day, self.get(day)))
    }

    /// Returns true if no day has a meal assigned.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl Serialize for WeeklyPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Day::ALL.len()))?;
        for (day, meal) in self.iter() {
            map.serialize_entry(day.name(), &meal)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for WeeklyPlan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut raw: HashMap<String, Option<Meal>> = HashMap::deserialize(deserializer)?;
        let mut plan = WeeklyPlan::new();
        for day in Day::ALL {
            if let Some(Some(meal)) = raw.remove(day.name()) {
                plan.assign(day, meal);
            }
        }
        Ok(plan)
    }
}

impl fmt::Display for WeeklyPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (day, meal) in self.iter() {
            match meal {
                Some(meal) => writeln!(f, "{:<10} {} ({})", day.name(), meal.name, meal.id)?,
                None => writeln!(f, "{:<10} -", day.name())?,
            }
        }
        Ok(())
    }
}

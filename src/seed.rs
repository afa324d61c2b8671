use tracing::{info, instrument};

use crate::db::HabitRepository;
use crate::error::AppError;
use crate::models::Measurement;

#[derive(Debug, Clone, Copy)]
pub struct SeedUnit {
    pub name: &'static str,
    pub symbol: &'static str,
    pub measurement: Measurement,
}

#[derive(Debug, Clone, Copy)]
pub struct SeedHabit {
    pub name: &'static str,
    pub icon: &'static str,
    pub measurement: Measurement,
    /// Unit symbols, default first.
    pub units: &'static [&'static str],
    pub default_goal: f64,
}

const fn unit(name: &'static str, symbol: &'static str, measurement: Measurement) -> SeedUnit {
    SeedUnit {
        name,
        symbol,
        measurement,
    }
}

pub const UNITS: [SeedUnit; 15] = [
    unit("Minutes", "min", Measurement::Time),
    unit("Hours", "h", Measurement::Time),
    unit("Meters", "m", Measurement::Distance),
    unit("Kilometers", "km", Measurement::Distance),
    unit("Steps", "steps", Measurement::Count),
    unit("Kilograms", "kg", Measurement::Weight),
    unit("Grams", "g", Measurement::Weight),
    unit("Pounds", "lb", Measurement::Weight),
    unit("Ounces", "oz", Measurement::Weight),
    unit("Chapter", "ch", Measurement::Count),
    unit("Item", "item", Measurement::Count),
    unit("Episode", "eps", Measurement::Count),
    unit("Pages", "page", Measurement::Count),
    unit("Time", "time", Measurement::Count),
    unit("Volume", "l", Measurement::Volume),
];

pub const HABITS: [SeedHabit; 8] = [
    SeedHabit {
        name: "Run",
        icon: "🏃",
        measurement: Measurement::Distance,
        units: &["km", "m"],
        default_goal: 5.0,
    },
    SeedHabit {
        name: "Read Book",
        icon: "📚",
        measurement: Measurement::Time,
        units: &["min", "h"],
        default_goal: 60.0,
    },
    SeedHabit {
        name: "Meditate",
        icon: "🧘",
        measurement: Measurement::Time,
        units: &["min", "h"],
        default_goal: 60.0,
    },
    SeedHabit {
        name: "Study",
        icon: "👨‍💻",
        measurement: Measurement::Time,
        units: &["min", "h"],
        default_goal: 60.0,
    },
    SeedHabit {
        name: "Journal",
        icon: "📓",
        measurement: Measurement::Count,
        units: &["page"],
        default_goal: 3.0,
    },
    SeedHabit {
        name: "Water Plant",
        icon: "🌿",
        measurement: Measurement::Count,
        units: &["time"],
        default_goal: 2.0,
    },
    SeedHabit {
        name: "Walk",
        icon: "🚶",
        measurement: Measurement::Count,
        units: &["steps"],
        default_goal: 10000.0,
    },
    SeedHabit {
        name: "Drink Water",
        icon: "💧",
        measurement: Measurement::Volume,
        units: &["l"],
        default_goal: 2.0,
    },
];

/// Every habit must list at least one unit, and each unit must exist and
/// share the habit's measurement kind.
pub fn validate_catalog(units: &[SeedUnit], habits: &[SeedHabit]) -> Result<(), AppError> {
    for habit in habits {
        if habit.units.is_empty() {
            return Err(AppError::Internal(format!(
                "Habit '{}' has no units",
                habit.name
            )));
        }

        for symbol in habit.units {
            let unit = units
                .iter()
                .find(|u| u.symbol == *symbol)
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "Habit '{}' references unknown unit '{}'",
                        habit.name, symbol
                    ))
                })?;

            if unit.measurement != habit.measurement {
                return Err(AppError::Internal(format!(
                    "Habit '{}' measures {} but unit '{}' measures {}",
                    habit.name, habit.measurement, symbol, unit.measurement
                )));
            }
        }
    }

    Ok(())
}

#[instrument(skip_all)]
pub async fn seed_catalog(repo: &dyn HabitRepository) -> Result<(), AppError> {
    validate_catalog(&UNITS, &HABITS)?;

    if repo.seed_catalog(&UNITS, &HABITS).await? {
        info!(
            units = UNITS.len(),
            habits = HABITS.len(),
            "Seeded habit catalog"
        );
    } else {
        info!("Habit catalog already seeded");
    }

    Ok(())
}

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::auth::TokenIssuer;
use crate::dates::Clock;
use crate::db::{AuthRepository, HabitRepository};
use crate::error::AppError;
use crate::models::{GoalFrequency, NewUser, NewUserHabit};
use crate::random::random_display_name;

#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub gender: Option<String>,
    pub habit_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub token: String,
}

pub struct AuthService {
    users: Arc<dyn AuthRepository>,
    habits: Arc<dyn HabitRepository>,
    tokens: TokenIssuer,
    clock: Arc<dyn Clock>,
    hash_cost: u32,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn AuthRepository>,
        habits: Arc<dyn HabitRepository>,
        tokens: TokenIssuer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            habits,
            tokens,
            clock,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    /// Creates the account and its first user-habit, then signs a token.
    #[instrument(skip_all, fields(email = %registration.email, habit_id = registration.habit_id))]
    pub async fn register(&self, registration: Registration) -> Result<AuthToken, AppError> {
        info!("Registering user");

        if self
            .users
            .find_credentials_by_email(&registration.email)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicateEmail);
        }

        let habit = self
            .habits
            .get_habit(registration.habit_id)
            .await?
            .ok_or(AppError::InvalidHabitReference(registration.habit_id))?;
        let unit = habit
            .default_unit()
            .ok_or(AppError::InvalidHabitReference(habit.id))?;

        let password_hash = bcrypt::hash(&registration.password, self.hash_cost)?;

        let name = match registration.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => random_display_name(&mut rand::rng()),
        };

        let (user, user_habit_id) = self
            .users
            .create_user_with_habit(
                NewUser {
                    email: registration.email,
                    password_hash,
                    name,
                    gender: registration.gender.unwrap_or_default(),
                },
                NewUserHabit {
                    habit_id: habit.id,
                    unit_id: unit.id,
                    goal: habit.default_goal,
                    goal_frequency: GoalFrequency::Daily,
                },
            )
            .await?;

        info!(user_id = user.id, user_habit_id, "User registered");

        Ok(AuthToken {
            token: self.tokens.issue(&user)?,
        })
    }

    /// Verifies credentials, prepares today's progress rows and signs a token.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthToken, AppError> {
        info!("Login attempt");

        let Some(credentials) = self.users.find_credentials_by_email(email).await? else {
            return Err(AppError::InvalidCredentials);
        };

        match bcrypt::verify(password, &credentials.password_hash) {
            Ok(true) => {}
            Ok(false) => return Err(AppError::InvalidCredentials),
            Err(err) => {
                warn!(error = %err, "Stored password hash could not be verified");
                return Err(AppError::InvalidCredentials);
            }
        }

        let created = self
            .habits
            .ensure_progress_for_user(credentials.user.id, self.clock.today())
            .await?;
        info!(user_id = credentials.user.id, created, "Today's progress ready");

        Ok(AuthToken {
            token: self.tokens.issue(&credentials.user)?,
        })
    }
}

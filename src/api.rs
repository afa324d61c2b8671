use rocket::State;
use rocket::serde::{Deserialize, Serialize, json::Json};
use validator::Validate;

use crate::auth::AuthUser;
use crate::dates::SummaryMode;
use crate::error::AppError;
use crate::models::{GoalFrequency, UserHabit};
use crate::services::{
    ActivitySummary, AuthService, AuthToken, CatalogHabit, CreateUserHabit, DailyStat,
    HabitService, ProgressOutcome, ProgressSummary, Registration, UserHabitProgress,
};
use crate::validation::{JsonValidateExt, parse_date, parse_id};

/// Envelope shared by every JSON response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::with_message("Success", data)
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Email is not valid"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    pub name: Option<String>,
    pub gender: Option<String>,
    pub habit_id: i64,
}

impl From<RegisterRequest> for Registration {
    fn from(request: RegisterRequest) -> Self {
        Self {
            email: request.email,
            password: request.password,
            name: request.name,
            gender: request.gender,
            habit_id: request.habit_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Email is not valid"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateHabitRequest {
    pub habit_id: i64,
    pub unit_id: Option<i64>,
    #[validate(range(exclusive_min = 0.0, message = "Goal must be greater than 0"))]
    pub goal: Option<f64>,
    pub goal_frequency: Option<GoalFrequency>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ProgressRequest {
    #[validate(range(min = 0.0, message = "Value must not be negative"))]
    pub value: f64,
}

#[post("/auth/register", data = "<request>")]
pub async fn api_register(
    request: Json<RegisterRequest>,
    auth: &State<AuthService>,
) -> ApiResult<AuthToken> {
    let request = request.validate_body()?;
    let token = auth.register(request.into()).await?;
    Ok(Json(ApiResponse::with_message("Registered", token)))
}

#[post("/auth/login", data = "<request>")]
pub async fn api_login(
    request: Json<LoginRequest>,
    auth: &State<AuthService>,
) -> ApiResult<AuthToken> {
    let request = request.validate_body()?;
    let token = auth.login(&request.email, &request.password).await?;
    Ok(Json(ApiResponse::with_message("Logged in", token)))
}

#[get("/auth/protected/check")]
pub fn api_check(user: AuthUser) -> Json<ApiResponse<AuthUser>> {
    Json(ApiResponse::with_message("Token is valid", user))
}

#[get("/habit/random")]
pub async fn api_random_habits(habits: &State<HabitService>) -> ApiResult<Vec<CatalogHabit>> {
    Ok(Json(ApiResponse::ok(habits.random_habits().await?)))
}

#[post("/protected/habit/create", data = "<request>")]
pub async fn api_create_habit(
    user: AuthUser,
    request: Json<CreateHabitRequest>,
    habits: &State<HabitService>,
) -> ApiResult<UserHabit> {
    let request = request.validate_body()?;
    let created = habits
        .create_user_habit(
            user.id,
            CreateUserHabit {
                habit_id: request.habit_id,
                unit_id: request.unit_id,
                goal: request.goal,
                goal_frequency: request.goal_frequency,
            },
        )
        .await?;

    Ok(Json(ApiResponse::with_message("Habit created", created)))
}

#[get("/protected/habit/today")]
pub async fn api_today_habits(
    user: AuthUser,
    habits: &State<HabitService>,
) -> ApiResult<Vec<UserHabitProgress>> {
    Ok(Json(ApiResponse::ok(habits.today_habits(user.id).await?)))
}

#[get("/protected/habit/list")]
pub async fn api_list_habits(
    user: AuthUser,
    habits: &State<HabitService>,
) -> ApiResult<Vec<UserHabitProgress>> {
    Ok(Json(ApiResponse::ok(habits.user_habits(user.id).await?)))
}

#[post("/protected/habit/<user_habit_id>/progress", data = "<request>")]
pub async fn api_post_progress(
    user: AuthUser,
    user_habit_id: i64,
    request: Json<ProgressRequest>,
    habits: &State<HabitService>,
) -> ApiResult<ProgressOutcome> {
    let request = request.validate_body()?;
    let outcome = habits
        .post_progress(user.id, user_habit_id, request.value)
        .await?;

    let message = if outcome.milestone.is_some() {
        "Goal completed"
    } else {
        "Progress recorded"
    };
    Ok(Json(ApiResponse::with_message(message, outcome)))
}

#[get("/protected/habit/summary?<mode>&<from>&<to>")]
pub async fn api_summary(
    user: AuthUser,
    mode: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
    habits: &State<HabitService>,
) -> ApiResult<ProgressSummary> {
    let range = SummaryMode::parse(mode).resolve(
        habits.today(),
        parse_date(from, "from")?,
        parse_date(to, "to")?,
    )?;

    Ok(Json(ApiResponse::ok(
        habits.progress_summary(user.id, range).await?,
    )))
}

#[get("/protected/habit/activity?<user_habit_id>&<mode>&<from>&<to>")]
pub async fn api_activity(
    user: AuthUser,
    user_habit_id: Option<&str>,
    mode: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
    habits: &State<HabitService>,
) -> ApiResult<ActivitySummary> {
    let range = SummaryMode::parse(mode).resolve(
        habits.today(),
        parse_date(from, "from")?,
        parse_date(to, "to")?,
    )?;
    // 0 selects every habit of the caller
    let user_habit_id = parse_id(user_habit_id, "user_habit_id")?.filter(|id| *id != 0);

    Ok(Json(ApiResponse::ok(
        habits
            .activity_summary(user.id, user_habit_id, range)
            .await?,
    )))
}

#[get("/protected/habit/daily-stats?<from>&<to>")]
pub async fn api_daily_stats(
    user: AuthUser,
    from: Option<&str>,
    to: Option<&str>,
    habits: &State<HabitService>,
) -> ApiResult<Vec<DailyStat>> {
    let from = parse_date(from, "from")?;
    let to = parse_date(to, "to")?.unwrap_or_else(|| habits.today());

    Ok(Json(ApiResponse::ok(
        habits.daily_stats(user.id, from, to).await?,
    )))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

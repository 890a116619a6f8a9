use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::accounts::{AccountDirectory, AccountError};
use crate::clock::{self, local_now, minute_of};
use crate::engine::{drop_started, group, Engine, EngineError};
use crate::limits::{MAX_EMAIL_LEN, MAX_GUESTS, MAX_NAME_LEN};
use crate::model::*;
use crate::notify::{self, Dispatcher};
use crate::observability::{AUTH_FAILURES_TOTAL, BOOKINGS_TOTAL};
use crate::session::{SessionError, SessionRegistry};
use crate::slots;

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InvalidGuests(u32),
    InvalidDate(String),
    InvalidTime(String),
    DateInPast,
    TimeInPast,
    OutsideServiceHours,
    MissingField(&'static str),
    Limit(&'static str),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidGuests(n) => {
                write!(f, "number of guests must be between 1 and {MAX_GUESTS}, got {n}")
            }
            ValidationError::InvalidDate(s) => write!(f, "invalid date {s:?}, expected YYYY-MM-DD"),
            ValidationError::InvalidTime(s) => write!(f, "invalid time {s:?}, expected HH:MM"),
            ValidationError::DateInPast => write!(f, "cannot book a past date"),
            ValidationError::TimeInPast => write!(f, "cannot book a time that has already passed"),
            ValidationError::OutsideServiceHours => {
                write!(f, "bookings are accepted 12:00-15:00 and 19:00-23:00")
            }
            ValidationError::MissingField(field) => write!(f, "{field} is required"),
            ValidationError::Limit(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    Validation(ValidationError),
    NoAvailableTable,
    /// `None` when the token is valid but its account no longer exists.
    Unauthorized(Option<SessionError>),
    Forbidden,
    AuthFailed,
    UsernameTaken,
    NotFound,
    AlreadyFinalized,
    Internal(String),
}

impl ServiceError {
    /// Stable identifier for the wire protocol.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::NoAvailableTable => "no_available_table",
            ServiceError::Unauthorized(Some(SessionError::TokenExpired)) => "token_expired",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::Forbidden => "forbidden",
            ServiceError::AuthFailed => "auth_failed",
            ServiceError::UsernameTaken => "username_taken",
            ServiceError::NotFound => "not_found",
            ServiceError::AlreadyFinalized => "already_finalized",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Validation(v) => write!(f, "{v}"),
            ServiceError::NoAvailableTable => {
                write!(f, "no table available at that time, please pick another slot")
            }
            ServiceError::Unauthorized(_) => write!(f, "session invalid, please log in again"),
            ServiceError::Forbidden => write!(f, "not allowed for this account"),
            ServiceError::AuthFailed => write!(f, "invalid username or password"),
            ServiceError::UsernameTaken => write!(f, "username already exists"),
            ServiceError::NotFound => write!(f, "not found"),
            ServiceError::AlreadyFinalized => write!(f, "reservation already finalized"),
            // storage detail stays in the server log
            ServiceError::Internal(_) => write!(f, "internal error"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<ValidationError> for ServiceError {
    fn from(v: ValidationError) -> Self {
        ServiceError::Validation(v)
    }
}

impl From<SessionError> for ServiceError {
    fn from(e: SessionError) -> Self {
        ServiceError::Unauthorized(Some(e))
    }
}

impl From<AccountError> for ServiceError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::UsernameTaken(_) => ServiceError::UsernameTaken,
        }
    }
}

impl From<EngineError> for ServiceError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::InvalidTimeFormat(s) => ValidationError::InvalidTime(s).into(),
            EngineError::InvalidDateFormat(s) => ValidationError::InvalidDate(s).into(),
            EngineError::InvalidGuests(n) => ValidationError::InvalidGuests(n).into(),
            EngineError::LimitExceeded(msg) => ValidationError::Limit(msg).into(),
            EngineError::NoAvailableTable => ServiceError::NoAvailableTable,
            EngineError::TableNotFound(_) | EngineError::NotFound(_) => ServiceError::NotFound,
            EngineError::AlreadyFinalized { .. } => ServiceError::AlreadyFinalized,
            EngineError::Storage(msg) => {
                error!("storage failure: {msg}");
                ServiceError::Internal(msg)
            }
        }
    }
}

// ── Capabilities ─────────────────────────────────────────────────

/// Proof that the caller holds a live client session. Only [`BookingService`] mints these.
#[derive(Debug, Clone)]
pub struct ClientSession {
    account: Account,
}

impl ClientSession {
    pub fn account(&self) -> &Account {
        &self.account
    }
}

/// Proof that the caller holds a live admin session.
#[derive(Debug, Clone)]
pub struct AdminSession {
    account: Account,
}

impl AdminSession {
    pub fn account(&self) -> &Account {
        &self.account
    }
}

#[derive(Debug, Clone)]
pub enum Capability {
    Client(ClientSession),
    Admin(AdminSession),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub role: Role,
}

// ── Operations ───────────────────────────────────────────────────

/// The operation surface of the reservation system. Transport-agnostic.
pub struct BookingService {
    engine: Arc<Engine>,
    sessions: Arc<SessionRegistry>,
    accounts: Arc<dyn AccountDirectory>,
    dispatcher: Dispatcher,
    restaurant: String,
}

impl BookingService {
    pub fn new(
        engine: Arc<Engine>,
        sessions: Arc<SessionRegistry>,
        accounts: Arc<dyn AccountDirectory>,
        dispatcher: Dispatcher,
        restaurant: String,
    ) -> Self {
        Self {
            engine,
            sessions,
            accounts,
            dispatcher,
            restaurant,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub async fn authenticate(&self, username: &str, password: &str) -> Result<LoginOutcome, ServiceError> {
        let Some(account) = self.accounts.authenticate(username, password).await else {
            metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
            debug!("login failed for {username}");
            return Err(ServiceError::AuthFailed);
        };
        let token = self.sessions.issue(&account.username);
        info!("{} logged in as {:?}", account.username, account.role);
        Ok(LoginOutcome {
            token,
            role: account.role,
        })
    }

    /// Open a client account. Admins are provisioned by the operator, never here.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<Account, ServiceError> {
        check_registration(username, password, first_name, last_name, email)?;
        let account = self
            .accounts
            .register(username, password, first_name.trim(), last_name.trim(), email.trim())
            .await?;
        info!("{} registered", account.username);
        Ok(account)
    }

    /// Idempotent; an unknown token is not an error.
    pub fn logout(&self, token: &str) {
        self.sessions.revoke(token);
    }

    pub async fn authorize(&self, token: &str) -> Result<Capability, ServiceError> {
        let username = self.sessions.validate(token)?;
        let account = self
            .accounts
            .lookup(&username)
            .await
            .ok_or(ServiceError::Unauthorized(None))?;
        Ok(match account.role {
            Role::Client => Capability::Client(ClientSession { account }),
            Role::Admin => Capability::Admin(AdminSession { account }),
        })
    }

    pub async fn authorize_client(&self, token: &str) -> Result<ClientSession, ServiceError> {
        match self.authorize(token).await? {
            Capability::Client(session) => Ok(session),
            Capability::Admin(_) => Err(ServiceError::Forbidden),
        }
    }

    pub async fn authorize_admin(&self, token: &str) -> Result<AdminSession, ServiceError> {
        match self.authorize(token).await? {
            Capability::Admin(session) => Ok(session),
            Capability::Client(_) => Err(ServiceError::Forbidden),
        }
    }

    pub async fn get_available_slots(&self, date: &str, guests: u32) -> Result<AvailableSlots, ServiceError> {
        self.get_available_slots_at(date, guests, local_now()).await
    }

    /// Free catalog slots on `date`. On the current day, slots that already started are left out.
    pub async fn get_available_slots_at(
        &self,
        date: &str,
        guests: u32,
        now: NaiveDateTime,
    ) -> Result<AvailableSlots, ServiceError> {
        check_guests(guests)?;
        let date = clock::parse_date(date)?;
        let today = now.date();
        if date < today {
            return Err(ValidationError::DateInPast.into());
        }
        let mut found = self.engine.scan_slots(date, guests).await?;
        if date == today {
            found = drop_started(&found, minute_of(&now.time()));
        }
        Ok(group(&found))
    }

    pub async fn create_booking(
        &self,
        token: &str,
        date: &str,
        time: &str,
        guests: u32,
    ) -> Result<Reservation, ServiceError> {
        self.create_booking_at(token, date, time, guests, local_now()).await
    }

    /// Match a table and claim it for the session's account in one step.
    pub async fn create_booking_at(
        &self,
        token: &str,
        date: &str,
        time: &str,
        guests: u32,
        now: NaiveDateTime,
    ) -> Result<Reservation, ServiceError> {
        let client = self.authorize_client(token).await?;
        let result = self.book_for(&client, date, time, guests, now).await;
        let outcome = match &result {
            Ok(_) => "created",
            Err(ServiceError::NoAvailableTable) => "no_table",
            Err(ServiceError::Validation(_)) => "invalid",
            Err(_) => "error",
        };
        metrics::counter!(BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn book_for(
        &self,
        client: &ClientSession,
        date: &str,
        time: &str,
        guests: u32,
        now: NaiveDateTime,
    ) -> Result<Reservation, ServiceError> {
        check_guests(guests)?;
        let date = clock::parse_date(date)?;
        let time = clock::parse_time(time)?;
        check_not_past(date, time, now)?;
        if !slots::within_service_hours(time) {
            return Err(ValidationError::OutsideServiceHours.into());
        }
        let account = client.account();
        Ok(self
            .engine
            .book(account.full_name(), account.email.clone(), date, time, guests)
            .await?)
    }

    pub async fn list_my_bookings(&self, token: &str) -> Result<Vec<Reservation>, ServiceError> {
        let client = self.authorize_client(token).await?;
        Ok(self.engine.list_by_email(&client.account().email).await)
    }

    /// Cancel one of the caller's own reservations. Someone else's is reported as missing.
    pub async fn cancel_my_booking(&self, token: &str, id: ReservationId) -> Result<Reservation, ServiceError> {
        let client = self.authorize_client(token).await?;
        let existing = self.engine.get_reservation(id).await?;
        if existing.email != client.account().email {
            return Err(ServiceError::NotFound);
        }
        Ok(self.engine.cancel(id).await?)
    }

    pub async fn admin_confirm(&self, token: &str, id: ReservationId) -> Result<Reservation, ServiceError> {
        self.authorize_admin(token).await?;
        let reservation = self.engine.confirm(id).await?;
        self.dispatcher
            .dispatch(notify::confirmation(&reservation, &self.restaurant));
        Ok(reservation)
    }

    pub async fn admin_reject(&self, token: &str, id: ReservationId) -> Result<Reservation, ServiceError> {
        self.authorize_admin(token).await?;
        let reservation = self.engine.reject(id).await?;
        self.dispatcher
            .dispatch(notify::rejection(&reservation, &self.restaurant));
        Ok(reservation)
    }

    pub async fn admin_list(&self, token: &str) -> Result<Vec<Reservation>, ServiceError> {
        self.authorize_admin(token).await?;
        Ok(self.engine.list_all().await)
    }

    pub async fn admin_stats(&self, token: &str) -> Result<AdminStats, ServiceError> {
        self.admin_stats_on(token, local_now().date()).await
    }

    pub async fn admin_stats_on(&self, token: &str, today: NaiveDate) -> Result<AdminStats, ServiceError> {
        self.authorize_admin(token).await?;
        Ok(self.engine.stats_on(today).await)
    }

    pub async fn admin_set_table_status(
        &self,
        token: &str,
        table_id: TableId,
        status: TableStatus,
    ) -> Result<Table, ServiceError> {
        let admin = self.authorize_admin(token).await?;
        let table = self.engine.set_table_status(table_id, status).await?;
        info!("{} set table {table_id} {status}", admin.account().username);
        Ok(table)
    }
}

fn check_guests(guests: u32) -> Result<(), ValidationError> {
    if guests == 0 || guests > MAX_GUESTS {
        return Err(ValidationError::InvalidGuests(guests));
    }
    Ok(())
}

fn check_registration(
    username: &str,
    password: &str,
    first_name: &str,
    last_name: &str,
    email: &str,
) -> Result<(), ValidationError> {
    if username.trim().is_empty() {
        return Err(ValidationError::MissingField("username"));
    }
    if password.is_empty() {
        return Err(ValidationError::MissingField("password"));
    }
    if email.trim().is_empty() {
        return Err(ValidationError::MissingField("email"));
    }
    if username.len() > MAX_NAME_LEN || first_name.len() + last_name.len() + 1 > MAX_NAME_LEN {
        return Err(ValidationError::Limit("name too long"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(ValidationError::Limit("email too long"));
    }
    Ok(())
}

fn check_not_past(date: NaiveDate, time: Minute, now: NaiveDateTime) -> Result<(), ValidationError> {
    let today = now.date();
    if date < today {
        return Err(ValidationError::DateInPast);
    }
    if date == today && time <= minute_of(&now.time()) {
        return Err(ValidationError::TimeInPast);
    }
    Ok(())
}

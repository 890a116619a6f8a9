use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::observability::{REQUESTS_TOTAL, REQUEST_DURATION_SECONDS};
use crate::service::{BookingService, ServiceError};

/// One request per line: `{"op": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Register {
        username: String,
        password: String,
        #[serde(default)]
        first_name: String,
        #[serde(default)]
        last_name: String,
        email: String,
    },
    Login { username: String, password: String },
    Logout { token: String },
    AvailableSlots { date: String, guests: u32 },
    Book { token: String, date: String, time: String, guests: u32 },
    MyBookings { token: String },
    Cancel { token: String, id: ReservationId },
    AdminConfirm { token: String, id: ReservationId },
    AdminReject { token: String, id: ReservationId },
    AdminList { token: String },
    AdminStats { token: String },
    AdminSetTableStatus { token: String, table_id: TableId, status: TableStatus },
}

impl Request {
    fn op(&self) -> &'static str {
        match self {
            Request::Register { .. } => "register",
            Request::Login { .. } => "login",
            Request::Logout { .. } => "logout",
            Request::AvailableSlots { .. } => "available_slots",
            Request::Book { .. } => "book",
            Request::MyBookings { .. } => "my_bookings",
            Request::Cancel { .. } => "cancel",
            Request::AdminConfirm { .. } => "admin_confirm",
            Request::AdminReject { .. } => "admin_reject",
            Request::AdminList { .. } => "admin_list",
            Request::AdminStats { .. } => "admin_stats",
            Request::AdminSetTableStatus { .. } => "admin_set_table_status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    fn failure(kind: &str, message: String) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(kind.to_string()),
            message: Some(message),
        }
    }
}

impl From<&ServiceError> for Response {
    fn from(e: &ServiceError) -> Self {
        Response::failure(e.kind(), e.to_string())
    }
}

/// Serve one client until it disconnects.
pub async fn process_connection<S>(socket: S, service: Arc<BookingService>) -> Result<(), LinesCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    while let Some(line) = framed.next().await {
        let response = match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(&service, &line).await,
            // the codec skips to the next newline and keeps going
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                Response::failure("bad_request", format!("line longer than {MAX_LINE_LEN} bytes"))
            }
            Err(e) => return Err(e),
        };
        let encoded = serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"ok":false,"error":"internal","message":"internal error"}"#.into());
        framed.send(encoded).await?;
    }
    Ok(())
}

/// Decode, execute and encode one request line.
pub async fn handle_line(service: &BookingService, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            metrics::counter!(REQUESTS_TOTAL, "op" => "unknown", "status" => "bad_request").increment(1);
            return Response::failure("bad_request", e.to_string());
        }
    };
    let op = request.op();
    let start = Instant::now();
    let result = execute(service, request).await;
    metrics::histogram!(REQUEST_DURATION_SECONDS, "op" => op).record(start.elapsed().as_secs_f64());
    match result {
        Ok(data) => {
            metrics::counter!(REQUESTS_TOTAL, "op" => op, "status" => "ok").increment(1);
            Response::success(data)
        }
        Err(e) => {
            metrics::counter!(REQUESTS_TOTAL, "op" => op, "status" => e.kind()).increment(1);
            tracing::debug!("{op} failed: {e}");
            Response::from(&e)
        }
    }
}

async fn execute(svc: &BookingService, request: Request) -> Result<Value, ServiceError> {
    match request {
        Request::Register {
            username,
            password,
            first_name,
            last_name,
            email,
        } => {
            let account = svc
                .register(&username, &password, &first_name, &last_name, &email)
                .await?;
            Ok(json!({"username": account.username, "role": account.role}))
        }
        Request::Login { username, password } => to_data(svc.authenticate(&username, &password).await?),
        Request::Logout { token } => {
            svc.logout(&token);
            Ok(Value::Null)
        }
        Request::AvailableSlots { date, guests } => {
            to_data(svc.get_available_slots(&date, guests).await?)
        }
        Request::Book {
            token,
            date,
            time,
            guests,
        } => {
            let r = svc.create_booking(&token, &date, &time, guests).await?;
            to_data(ReservationInfo::from(&r))
        }
        Request::MyBookings { token } => to_data(infos(&svc.list_my_bookings(&token).await?)),
        Request::Cancel { token, id } => {
            to_data(ReservationInfo::from(&svc.cancel_my_booking(&token, id).await?))
        }
        Request::AdminConfirm { token, id } => {
            to_data(ReservationInfo::from(&svc.admin_confirm(&token, id).await?))
        }
        Request::AdminReject { token, id } => {
            to_data(ReservationInfo::from(&svc.admin_reject(&token, id).await?))
        }
        Request::AdminList { token } => to_data(infos(&svc.admin_list(&token).await?)),
        Request::AdminStats { token } => to_data(svc.admin_stats(&token).await?),
        Request::AdminSetTableStatus {
            token,
            table_id,
            status,
        } => to_data(svc.admin_set_table_status(&token, table_id, status).await?),
    }
}

fn infos(reservations: &[Reservation]) -> Vec<ReservationInfo> {
    reservations.iter().map(ReservationInfo::from).collect()
}

fn to_data<T: Serialize>(value: T) -> Result<Value, ServiceError> {
    serde_json::to_value(value).map_err(|e| ServiceError::Internal(e.to_string()))
}

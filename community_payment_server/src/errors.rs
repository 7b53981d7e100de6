use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use community_payment_engine::{CommissionError, InviteError, LedgerError, PaymentGatewayError};
use log::error;
use serde_json::json;
use thiserror::Error;

/// Every error the server can return. Engine errors are wrapped as-is, so that each one keeps a stable machine
/// readable code (see [`ServerError::code`]) in the JSON error body:
///
/// ```json
/// { "error": { "code": "INSUFFICIENT_BALANCE", "message": "Insufficient balance in account #3. ..." } }
/// ```
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("No user identity was supplied. {0}")]
    MissingIdentity(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Payment(#[from] PaymentGatewayError),
    #[error(transparent)]
    Invite(#[from] InviteError),
    #[error(transparent)]
    Commission(#[from] CommissionError),
}

impl ServerError {
    /// The stable error code reported to clients.
    pub fn code(&self) -> &'static str {
        self.kind().1
    }

    fn kind(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InitializeError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INITIALIZE_ERROR"),
            Self::BackendError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "BACKEND_ERROR"),
            Self::InvalidRequestBody(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST_BODY"),
            Self::InvalidRequestPath(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST_PATH"),
            Self::IOError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Self::ConfigurationError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR"),
            Self::Unspecified(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UNSPECIFIED"),
            Self::MissingIdentity(_) => (StatusCode::UNAUTHORIZED, "MISSING_IDENTITY"),
            Self::InsufficientPermissions(_) => (StatusCode::FORBIDDEN, "INSUFFICIENT_PERMISSIONS"),
            Self::NoRecordFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Ledger(e) => ledger_error_kind(e),
            Self::Payment(e) => payment_error_kind(e),
            Self::Invite(e) => invite_error_kind(e),
            Self::Commission(e) => commission_error_kind(e),
        }
    }
}

fn ledger_error_kind(e: &LedgerError) -> (StatusCode, &'static str) {
    match e {
        LedgerError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
        LedgerError::AmountMustBePositive(_) => (StatusCode::BAD_REQUEST, "AMOUNT_MUST_BE_POSITIVE"),
        LedgerError::InsufficientBalance { .. } => (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_BALANCE"),
        LedgerError::InsufficientScore { .. } => (StatusCode::BAD_REQUEST, "INSUFFICIENT_SCORE"),
        LedgerError::BalanceOverflow { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "BALANCE_OVERFLOW"),
        LedgerError::ScoreOverflow { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "SCORE_OVERFLOW"),
        LedgerError::ZeroScoreAdjustment => (StatusCode::BAD_REQUEST, "ZERO_SCORE_ADJUSTMENT"),
        LedgerError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND"),
        LedgerError::UsernameTaken(_) => (StatusCode::CONFLICT, "USERNAME_TAKEN"),
    }
}

fn payment_error_kind(e: &PaymentGatewayError) -> (StatusCode, &'static str) {
    match e {
        PaymentGatewayError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
        PaymentGatewayError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
        PaymentGatewayError::AlreadyPaid(_) => (StatusCode::CONFLICT, "ALREADY_PAID"),
        PaymentGatewayError::OrderModificationForbidden { .. } => {
            (StatusCode::CONFLICT, "ORDER_MODIFICATION_FORBIDDEN")
        },
        PaymentGatewayError::NotAuthorized(_) => (StatusCode::FORBIDDEN, "NOT_AUTHORIZED"),
        PaymentGatewayError::InvalidOrder(_) => (StatusCode::BAD_REQUEST, "INVALID_ORDER"),
        PaymentGatewayError::AmountMustBePositive(_) => (StatusCode::BAD_REQUEST, "AMOUNT_MUST_BE_POSITIVE"),
        PaymentGatewayError::InvalidSignature => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
        PaymentGatewayError::UnsupportedPaymentMethod(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_PAYMENT_METHOD"),
        PaymentGatewayError::PaymentMethodDisabled(_) => (StatusCode::BAD_REQUEST, "PAYMENT_METHOD_DISABLED"),
        PaymentGatewayError::AmountMismatch { .. } => (StatusCode::BAD_REQUEST, "AMOUNT_MISMATCH"),
        PaymentGatewayError::PaymentRecordNotFound(_) => (StatusCode::NOT_FOUND, "PAYMENT_RECORD_NOT_FOUND"),
        PaymentGatewayError::ProviderError(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
        PaymentGatewayError::SettlementError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SETTLEMENT_ERROR"),
        PaymentGatewayError::AlreadySettled(_) => (StatusCode::CONFLICT, "ALREADY_SETTLED"),
        PaymentGatewayError::LedgerError(e) => ledger_error_kind(e),
    }
}

fn invite_error_kind(e: &InviteError) -> (StatusCode, &'static str) {
    match e {
        InviteError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
        InviteError::AlreadyLinked(_) => (StatusCode::CONFLICT, "ALREADY_LINKED"),
        InviteError::SelfInvite => (StatusCode::BAD_REQUEST, "SELF_INVITE"),
        InviteError::CodeExpired(_) => (StatusCode::GONE, "CODE_EXPIRED"),
        InviteError::CodeNotFound(_) => (StatusCode::NOT_FOUND, "CODE_NOT_FOUND"),
        InviteError::InvalidCode(_) => (StatusCode::BAD_REQUEST, "INVALID_CODE"),
        InviteError::InvalidRate(_) => (StatusCode::BAD_REQUEST, "INVALID_RATE"),
        InviteError::InvalidTtl(_) => (StatusCode::BAD_REQUEST, "INVALID_TTL"),
        InviteError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND"),
        InviteError::CommissionAlreadySettled(_) => (StatusCode::CONFLICT, "ALREADY_SETTLED"),
        InviteError::LedgerError(e) => ledger_error_kind(e),
    }
}

fn commission_error_kind(e: &CommissionError) -> (StatusCode, &'static str) {
    match e {
        CommissionError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
        CommissionError::InvalidRate(_) => (StatusCode::BAD_REQUEST, "INVALID_RATE"),
        CommissionError::ConfigurationMissing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_MISSING"),
        CommissionError::AmountMustBePositive(_) => (StatusCode::BAD_REQUEST, "AMOUNT_MUST_BE_POSITIVE"),
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        self.kind().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, code) = self.kind();
        if status.is_server_error() {
            error!("💻️ {code}: {self}");
        }
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .body(json!({ "error": { "code": code, "message": self.to_string() } }).to_string())
    }
}

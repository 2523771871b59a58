use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

lazy_static! {
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "auth_logins_total",
        "Login attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref REFRESH_COUNTER: CounterVec = register_counter_vec!(
        "auth_refresh_total",
        "Refresh token rotations by outcome",
        &["status"]
    ).unwrap();

    pub static ref RATE_LIMITED_COUNTER: CounterVec = register_counter_vec!(
        "auth_rate_limited_total",
        "Requests rejected by the sliding-window limiter",
        &["purpose"]
    ).unwrap();

    pub static ref PASSWORD_RESETS_COUNTER: CounterVec = register_counter_vec!(
        "auth_password_resets_total",
        "Password reset flow by stage",
        &["stage"]
    ).unwrap();

    pub static ref NOTIFICATIONS_COUNTER: CounterVec = register_counter_vec!(
        "auth_notifications_total",
        "Account emails by kind and delivery status",
        &["kind", "status"]
    ).unwrap();

    pub static ref SESSIONS_SWEPT_COUNTER: CounterVec = register_counter_vec!(
        "auth_sessions_swept_total",
        "Expired sessions removed by the background sweeper",
        &["result"]
    ).unwrap();
}

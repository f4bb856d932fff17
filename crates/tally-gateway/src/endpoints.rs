pub const DASHBOARD_ENDPOINT: &str = "/";
pub const LOG_FORM_ENDPOINT: &str = "/log";
pub const DOWNLOAD_ENDPOINT: &str = "/download";
pub const LOGIN_ENDPOINT: &str = "/login";
pub const LOGOUT_ENDPOINT: &str = "/logout";
pub const STATUS_ENDPOINT: &str = "/status";
pub const API_LOGS_ENDPOINT: &str = "/api/v1/logs";
pub const API_SEARCH_ENDPOINT: &str = "/api/v1/search";
pub const API_STATS_ENDPOINT: &str = "/api/v1/stats";
pub const API_SUMMARY_ENDPOINT: &str = "/api/v1/summary";

pub const API_KEY_HEADER: &str = "x-api-key";
pub const SESSION_COOKIE_NAME: &str = "tally_session";

use std::str::FromStr;

lazy_static! {
    pub static ref ENV_TELLO_ADDR: String =
        get_env_str("ENV_TELLO_ADDR", String::from("192.168.10.1"));
    pub static ref ENV_TELLO_CMD_PORT: u16 = get_env("ENV_TELLO_CMD_PORT", 8889);
    pub static ref ENV_TELLO_LOCAL_CMD_PORT: u16 = get_env("ENV_TELLO_LOCAL_CMD_PORT", 8889);
    pub static ref ENV_TELLO_STATE_PORT: u16 = get_env("ENV_TELLO_STATE_PORT", 8890);
    pub static ref ENV_TELLO_VIDEO_PORT: u16 = get_env("ENV_TELLO_VIDEO_PORT", 11111);
    pub static ref ENV_TELLO_VIDEO_WIDTH: u32 = get_env("ENV_TELLO_VIDEO_WIDTH", 640);
    pub static ref ENV_TELLO_VIDEO_HEIGHT: u32 = get_env("ENV_TELLO_VIDEO_HEIGHT", 480);
    pub static ref ENV_TELLO_TICK_MS: u64 = get_env("ENV_TELLO_TICK_MS", 100);
    pub static ref ENV_TELLO_REPLY_TIMEOUT_MS: u64 = get_env("ENV_TELLO_REPLY_TIMEOUT_MS", 300);
    pub static ref ENV_TELLO_READ_TIMEOUT_MS: u64 = get_env("ENV_TELLO_READ_TIMEOUT_MS", 500);
    pub static ref ENV_TELLO_KEEPALIVE_TICKS: u64 = get_env("ENV_TELLO_KEEPALIVE_TICKS", 100);
    pub static ref ENV_TELLO_CONNECT_RETRIES: u32 = get_env("ENV_TELLO_CONNECT_RETRIES", 20);
    pub static ref ENV_TELLO_RC_LIMIT: i32 = get_env("ENV_TELLO_RC_LIMIT", 30);
}

pub fn get_env_str(name: &str, value: String) -> String {
    std::env::var(name).unwrap_or(value)
}

pub fn get_env<T: FromStr>(name: &str, value: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<T>().unwrap_or(value),
        Err(_) => value,
    }
}

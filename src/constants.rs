pub mod network {
    pub const SSH_DEFAULT_PORT: u16 = 22;
    pub const TIMEOUT_SSH_CONNECT_MS: u64 = 10_000;
    pub const KEEPALIVE_INTERVAL_SECS: u32 = 30;
}

pub mod exec {
    pub const POLL_INTERVAL_MS: u64 = 20;
    pub const READ_CHUNK_BYTES: usize = 8192;
    pub const PTY_TERM: &str = "xterm";
    pub const DRY_RUN_MARKER: &str = "[dry-run]";
}

pub mod transfer {
    pub const TEMP_DIR: &str = "/tmp";
    pub const CHUNK_BYTES: usize = 64 * 1024;
    pub const REMOTE_FILE_MODE: i32 = 0o644;
}

pub mod context {
    pub const MULTIPLEXER_PROGRAM: &str = "screen";
    pub const MULTIPLEXER_DEFAULT_NAME: &str = "default";
}

pub mod paths {
    pub const CONFIG_ENV: &str = "SSHTASK_CONFIG";
    pub const CONFIG_DEFAULT: &str = "~/.config/sshtask/hosts.json";
    pub const KNOWN_HOSTS_DEFAULT: &str = "~/.ssh/known_hosts";
    pub const IDENTITY_FILES_DEFAULT: &[&str] =
        &["~/.ssh/id_ed25519", "~/.ssh/id_ecdsa", "~/.ssh/id_rsa"];
}

pub mod logging {
    pub const LEVEL_ENV: &str = "SSHTASK_LOG_LEVEL";
}

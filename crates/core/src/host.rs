//! Host identity.

/// Best-effort hostname of the current process, used to stamp job records
/// with their origin host.
///
/// Falls back to `"localhost"` when the environment exposes no hostname.
pub fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}

// Host identity resolution for execution logs

/// Address and hostname of the machine running a fire. Recorded on every
/// JobLog row so operators can see which node ran an attempt.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub ip: String,
    pub host: String,
}

/// Resolve the primary address and hostname. Either field degrades to
/// "unknown" on lookup failure; execution never blocks on identity.
pub fn resolve() -> ServerIdentity {
    let ip = match local_ip_address::local_ip() {
        Ok(addr) => addr.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to resolve local address");
            "unknown".to_string()
        }
    };

    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| {
            tracing::warn!("Failed to resolve hostname");
            "unknown".to_string()
        });

    ServerIdentity { ip, host }
}

//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the hub answers, `"degraded"` otherwise.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered WebSocket sessions.
    pub connections: usize,
    /// Live parties.
    pub parties: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, parties: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        parties,
    }
}

/// Health response when the hub did not answer.
pub fn degraded(start_time: Instant) -> HealthResponse {
    HealthResponse {
        status: "degraded".into(),
        ..health_check(start_time, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0, 0);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        assert!(health_check(start, 0, 0).uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), 2, 1);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 2);
        assert_eq!(parsed["parties"], 1);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[test]
    fn degraded_zeroes_counters() {
        let resp = degraded(Instant::now());
        assert_eq!(resp.status, "degraded");
        assert_eq!(resp.connections, 0);
        assert_eq!(resp.parties, 0);
    }
}

//! Health service (§6 `health.ping` route). Trivial by design: a
//! reachable RPC response is itself the health signal.

pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    pub fn ping(&self) -> &'static str {
        "ok"
    }
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_responds() {
        assert_eq!(HealthService::new().ping(), "ok");
    }
}

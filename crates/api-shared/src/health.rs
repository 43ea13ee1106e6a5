use crate::dto::HealthRes;

/// Health check shared by the scribe front ends.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    /// Liveness only; it does not report whether the inference engine has loaded.
    ///
    /// # Returns
    /// A `HealthRes` indicating the service is up.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "Scribe is alive".into(),
        }
    }

    /// Reports liveness together with engine readiness.
    pub fn check_readiness(engine_ready: bool) -> HealthRes {
        if engine_ready {
            Self::check_health()
        } else {
            HealthRes {
                ok: true,
                message: "Scribe is alive; model not loaded yet".into(),
            }
        }
    }
}

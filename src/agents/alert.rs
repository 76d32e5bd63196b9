use crate::log::{AlertPayload, MessageBody, MessageLog, Severity};
use crate::scenario::ScenarioKind;
use crate::world::{Phase, World};

use super::{Action, Agent, AgentKind};

pub(super) const DEFAULT_THRESHOLD: f64 = 0.5;
const CRITICAL_LEVEL: f64 = 0.8;
const HIGH_LEVEL: f64 = 0.65;

#[derive(Debug, Clone, PartialEq)]
pub struct AlertObservation {
    pub phase: Phase,
    pub scenario: Option<ScenarioKind>,
    pub seismic_level: f64,
    pub aftershock: bool,
    pub affected_areas: usize,
    pub time_step: u64,
}

/// Reflex agent: turns the seismic reading into a severity-tiered alert.
#[derive(Debug, Clone)]
pub struct AlertAgent {
    threshold: f64,
}

impl AlertAgent {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn severity(&self, seismic_level: f64, aftershock: bool) -> Option<Severity> {
        if aftershock || seismic_level >= CRITICAL_LEVEL.max(self.threshold) {
            Some(Severity::Critical)
        } else if seismic_level >= HIGH_LEVEL.max(self.threshold) {
            Some(Severity::High)
        } else if seismic_level >= self.threshold {
            Some(Severity::Medium)
        } else {
            None
        }
    }
}

impl Default for AlertAgent {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Agent for AlertAgent {
    type Observation = AlertObservation;

    fn kind(&self) -> AgentKind {
        AgentKind::Alert
    }

    fn observe(&self, world: &World, _log: &MessageLog) -> AlertObservation {
        AlertObservation {
            phase: world.phase(),
            scenario: world.scenario(),
            seismic_level: world.seismic_level(),
            aftershock: world.aftershock(),
            affected_areas: world.affected().len(),
            time_step: world.time_step(),
        }
    }

    fn decide(&mut self, obs: AlertObservation) -> Vec<Action> {
        if obs.phase != Phase::Response {
            return Vec::new();
        }
        let Some(severity) = self.severity(obs.seismic_level, obs.aftershock) else {
            return Vec::new();
        };
        vec![Action::Emit {
            body: MessageBody::Alert(AlertPayload {
                severity,
                scenario: obs.scenario,
                seismic_level: obs.seismic_level,
                threshold: self.threshold,
                aftershock: obs.aftershock,
                affected_areas: obs.affected_areas,
                time_step: obs.time_step,
            }),
            priority: severity.priority(),
        }]
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(seismic_level: f64, aftershock: bool) -> AlertObservation {
        AlertObservation {
            phase: Phase::Response,
            scenario: Some(ScenarioKind::Earthquake),
            seismic_level,
            aftershock,
            affected_areas: 27,
            time_step: 3,
        }
    }

    fn emitted(actions: &[Action]) -> Option<(Severity, u8)> {
        match actions {
            [Action::Emit {
                body: MessageBody::Alert(payload),
                priority,
            }] => Some((payload.severity, *priority)),
            [] => None,
            other => panic!("unexpected actions {other:?}"),
        }
    }

    #[test]
    fn severity_tiers_follow_seismic_level() {
        let mut agent = AlertAgent::default();
        assert_eq!(
            emitted(&agent.decide(obs(0.85, false))),
            Some((Severity::Critical, 10))
        );
        assert_eq!(
            emitted(&agent.decide(obs(0.7, false))),
            Some((Severity::High, 8))
        );
        assert_eq!(
            emitted(&agent.decide(obs(0.5, false))),
            Some((Severity::Medium, 5))
        );
        assert_eq!(emitted(&agent.decide(obs(0.3, false))), None);
    }

    #[test]
    fn aftershock_is_always_critical() {
        let mut agent = AlertAgent::default();
        assert_eq!(
            emitted(&agent.decide(obs(0.0, true))),
            Some((Severity::Critical, 10))
        );
    }

    #[test]
    fn silent_outside_response() {
        let mut agent = AlertAgent::default();
        let mut quiet = obs(0.9, true);
        quiet.phase = Phase::Rebuild;
        assert!(agent.decide(quiet).is_empty());
    }

    #[test]
    fn raised_threshold_suppresses_lower_tiers() {
        let mut agent = AlertAgent::new(0.7);
        assert_eq!(emitted(&agent.decide(obs(0.66, false))), None);
        assert_eq!(
            emitted(&agent.decide(obs(0.72, false))),
            Some((Severity::High, 8))
        );
    }
}

//! Scheduler - drives one coordination cycle over the world, the log and the agents

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::agents::{Action, AgentConfig, AgentKind, AgentSlot};
use crate::log::{Message, MessageBody, MessageId, MessageLog, PhaseChangePayload};
use crate::rng::{RngManager, UNITS_STREAM, WORLD_STREAM};
use crate::scenario::ScenarioKind;
use crate::units::{UnitFleet, UnitPosition};
use crate::world::{
    check_intensity, Allocation, InvariantViolation, Phase, StepReport, TriggerError, World,
    WorldSnapshot,
};

const SCHEDULER_SENDER: &str = "scheduler";
const PHASE_CHANGE_PRIORITY: u8 = 9;

fn default_prune_interval() -> u64 {
    10
}

fn default_prune_keep() -> usize {
    100
}

fn default_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

fn default_cycle_seconds() -> i64 {
    60
}

fn default_max_history() -> usize {
    100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Prune the log every this many cycles, 0 disables pruning.
    #[serde(default = "default_prune_interval")]
    pub prune_interval: u64,
    #[serde(default = "default_prune_keep")]
    pub prune_keep: usize,
    /// Timestamp of cycle zero. Message timestamps are `epoch + cycle * cycle_seconds`.
    #[serde(default = "default_epoch")]
    pub epoch: DateTime<Utc>,
    #[serde(default = "default_cycle_seconds")]
    pub cycle_seconds: i64,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            prune_interval: default_prune_interval(),
            prune_keep: default_prune_keep(),
            epoch: default_epoch(),
            cycle_seconds: default_cycle_seconds(),
            max_history: default_max_history(),
        }
    }
}

impl SchedulerSettings {
    pub fn timestamp(&self, cycle: u64) -> DateTime<Utc> {
        let offset = i64::try_from(cycle)
            .unwrap_or(i64::MAX)
            .saturating_mul(self.cycle_seconds);
        self.epoch + chrono::Duration::seconds(offset)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CycleError {
    #[error("invariant violated: {0}")]
    Invariant(InvariantViolation),
    #[error("halted after an earlier fault ({0}); reset to continue")]
    Halted(InvariantViolation),
    #[error("no cycle in progress")]
    NotStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
}

/// Everything a client needs after one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    pub world: WorldSnapshot,
    /// Messages published during this cycle, oldest first.
    pub messages: Vec<Message>,
    pub units: Vec<UnitPosition>,
    pub cycle: u64,
    pub paused: bool,
    pub transition: Option<PhaseTransition>,
}

/// Timing and bookkeeping for a single cycle.
#[derive(Debug, Clone)]
pub struct CycleStats {
    pub cycle: u64,
    pub phase: Phase,
    pub duration: Duration,
    pub agent_times: Vec<(AgentKind, Duration)>,
    pub messages: usize,
    pub victims_saved: u64,
}

/// Work in progress between `begin_cycle` and `finish_cycle`.
struct PendingCycle {
    cycle: u64,
    started: Instant,
    phase_before: Phase,
    first_unseen: MessageId,
    saved_floor: u64,
    episode: u64,
    report: StepReport,
    agent_times: Vec<(AgentKind, Duration)>,
}

pub struct Scheduler {
    world: World,
    log: MessageLog,
    agents: Vec<AgentSlot>,
    units: UnitFleet,
    rng: RngManager,
    settings: SchedulerSettings,
    cycle: u64,
    paused: bool,
    fault: Option<InvariantViolation>,
    pending: Option<PendingCycle>,
    stats_history: Vec<CycleStats>,
}

impl Scheduler {
    pub fn new(
        world: World,
        log: MessageLog,
        agent_config: &AgentConfig,
        seed: u64,
        settings: SchedulerSettings,
    ) -> Self {
        let mut scheduler = Self {
            world,
            log,
            agents: AgentSlot::roster(agent_config),
            units: UnitFleet::new(),
            rng: RngManager::new(seed),
            settings,
            cycle: 0,
            paused: false,
            fault: None,
            pending: None,
            stats_history: Vec::new(),
        };
        scheduler.prime_streams();
        scheduler
    }

    /// Streams derive from the master in first-use order, so touch them up front.
    fn prime_streams(&mut self) {
        self.rng.stream(WORLD_STREAM);
        self.rng.stream(UNITS_STREAM);
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut MessageLog {
        &mut self.log
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn fault(&self) -> Option<&InvariantViolation> {
        self.fault.as_ref()
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.world.snapshot()
    }

    pub fn unit_positions(&self) -> Vec<UnitPosition> {
        self.units.positions(self.world.graph())
    }

    pub fn pause(&mut self) -> bool {
        self.paused = true;
        self.paused
    }

    pub fn resume(&mut self) -> bool {
        self.paused = false;
        self.paused
    }

    /// Starts a disaster and announces the phase change.
    ///
    /// A disaster already in progress is abandoned through a full reset, so the
    /// only transition published here is `idle -> response`.
    pub fn trigger_disaster(
        &mut self,
        scenario: ScenarioKind,
        intensity: f64,
        overrides: Option<&Allocation>,
    ) -> Result<(), TriggerError> {
        check_intensity(intensity)?;
        if self.world.phase() != Phase::Idle {
            self.reset();
        }
        let before = self.world.phase();
        self.world.trigger_disaster(
            scenario,
            intensity,
            overrides,
            &mut self.rng.stream(WORLD_STREAM),
        )?;
        let after = self.world.phase();
        if before != after {
            self.publish_transition(
                PhaseTransition {
                    from: before,
                    to: after,
                },
                self.cycle,
            );
        }
        Ok(())
    }

    /// Back to a fresh idle world with the original seed.
    pub fn reset(&mut self) {
        self.world.reset();
        self.log.reset();
        for agent in &mut self.agents {
            agent.reset();
        }
        self.units.clear();
        self.rng.reseed();
        self.prime_streams();
        self.cycle = 0;
        self.paused = false;
        self.fault = None;
        self.pending = None;
        self.stats_history.clear();
        info!(seed = self.rng.seed(), "simulation reset");
    }

    /// Result returned while paused: the current state and no new messages.
    pub fn paused_result(&self) -> CycleResult {
        CycleResult {
            world: self.world.snapshot(),
            messages: Vec::new(),
            units: self.unit_positions(),
            cycle: self.cycle,
            paused: true,
            transition: None,
        }
    }

    /// Advances the world and returns the agents to run, or `None` when paused.
    pub fn begin_cycle(&mut self) -> Result<Option<Vec<AgentKind>>, CycleError> {
        if let Some(fault) = &self.fault {
            return Err(CycleError::Halted(fault.clone()));
        }
        if self.paused {
            return Ok(None);
        }

        let cycle = self.cycle + 1;
        let phase_before = self.world.phase();
        let first_unseen = self.log.head_id();
        let report = self.world.update(&mut self.rng.stream(WORLD_STREAM));
        if report.aftershock {
            debug!(cycle, new_victims = report.new_victims, "aftershock");
        }
        if let Some((scenario, intensity)) = report.auto_triggered {
            info!(cycle, %scenario, intensity, "cooldown over, new disaster");
        }

        let phase = self.world.phase();
        self.pending = Some(PendingCycle {
            cycle,
            started: Instant::now(),
            phase_before,
            first_unseen,
            saved_floor: self.world.victims_saved(),
            episode: self.world.episode(),
            report,
            agent_times: Vec::new(),
        });

        Ok(Some(
            AgentKind::ORDER
                .into_iter()
                .filter(|kind| kind.active_in(phase))
                .collect(),
        ))
    }

    /// One agent's observe, decide and act, followed by an invariant check.
    pub fn run_agent(&mut self, kind: AgentKind) -> Result<(), CycleError> {
        let Some(pending) = self.pending.as_ref() else {
            return Err(CycleError::NotStarted);
        };
        let cycle = pending.cycle;
        let timestamp = self.settings.timestamp(cycle);

        let started = Instant::now();
        let actions = match self.agents.iter_mut().find(|agent| agent.kind() == kind) {
            Some(agent) => agent.act(&self.world, &self.log),
            None => Vec::new(),
        };
        for action in actions {
            self.apply(kind, action, timestamp);
        }
        let elapsed = started.elapsed();

        if let Some(pending) = self.pending.as_mut() {
            pending.agent_times.push((kind, elapsed));
        }
        self.verify()
    }

    fn apply(&mut self, agent: AgentKind, action: Action, timestamp: DateTime<Utc>) {
        match action {
            Action::Emit { body, priority } => {
                self.log.send(agent.name(), body, priority, Some(timestamp));
            }
            Action::UseResource { kind, amount } => {
                self.world.use_resource(kind, amount);
            }
            Action::ReleaseResource { kind, amount } => {
                self.world.release_resource(kind, amount);
            }
            Action::SaveVictims { count } => {
                self.world.save_victims(count);
            }
            Action::RecruitCrew { food_cost } => {
                if self.world.recruit_crew(food_cost) {
                    debug!(agent = %agent, food_cost, "crew recruited");
                }
            }
        }
    }

    fn verify(&mut self) -> Result<(), CycleError> {
        let mut outcome = self.world.check_invariants();
        if let (Ok(()), Some(pending)) = (&outcome, &self.pending) {
            let saved = self.world.victims_saved();
            if self.world.episode() == pending.episode && saved < pending.saved_floor {
                outcome = Err(InvariantViolation::SavedDecreased {
                    before: pending.saved_floor,
                    after: saved,
                });
            }
        }
        outcome.map_err(|violation| self.latch(violation))
    }

    fn latch(&mut self, violation: InvariantViolation) -> CycleError {
        error!(cycle = self.cycle + 1, %violation, "cycle aborted");
        self.fault = Some(violation.clone());
        self.pending = None;
        CycleError::Invariant(violation)
    }

    /// Checks the transition, moves response units and closes the cycle.
    pub fn finish_cycle(&mut self) -> Result<CycleResult, CycleError> {
        let Some(pending) = self.pending.take() else {
            return Err(CycleError::NotStarted);
        };

        let to = self.world.phase();
        let transition = (pending.phase_before != to).then_some(PhaseTransition {
            from: pending.phase_before,
            to,
        });
        if let Some(transition) = transition {
            if !transition.from.can_become(transition.to) {
                return Err(self.latch(InvariantViolation::IllegalTransition {
                    from: transition.from,
                    to: transition.to,
                }));
            }
            self.publish_transition(transition, pending.cycle);
        }

        self.units.step(
            &self.world,
            pending.cycle,
            &mut self.rng.stream(UNITS_STREAM),
        );
        self.cycle = pending.cycle;

        let messages: Vec<Message> = self.log.since(pending.first_unseen).cloned().collect();
        if self.settings.prune_interval > 0 && self.cycle % self.settings.prune_interval == 0 {
            self.log.clear_old_messages(self.settings.prune_keep);
        }

        let stats = CycleStats {
            cycle: self.cycle,
            phase: to,
            duration: pending.started.elapsed(),
            agent_times: pending.agent_times,
            messages: messages.len(),
            victims_saved: self.world.victims_saved(),
        };
        debug!(
            cycle = stats.cycle,
            phase = %stats.phase,
            messages = stats.messages,
            victims = self.world.victims(),
            saved = stats.victims_saved,
            blocked = pending.report.edges_blocked,
            cleared = pending.report.edges_cleared,
            "cycle complete"
        );
        self.stats_history.push(stats);
        if self.stats_history.len() > self.settings.max_history {
            self.stats_history.remove(0);
        }

        Ok(CycleResult {
            world: self.world.snapshot(),
            messages,
            units: self.unit_positions(),
            cycle: self.cycle,
            paused: false,
            transition,
        })
    }

    /// Runs a whole cycle without yielding between agents.
    pub fn run_cycle(&mut self) -> Result<CycleResult, CycleError> {
        let Some(active) = self.begin_cycle()? else {
            return Ok(self.paused_result());
        };
        for kind in active {
            self.run_agent(kind)?;
        }
        self.finish_cycle()
    }

    fn publish_transition(&mut self, transition: PhaseTransition, cycle: u64) {
        info!(
            cycle,
            from = %transition.from,
            to = %transition.to,
            episode = self.world.episode(),
            "phase change"
        );
        self.log.send(
            SCHEDULER_SENDER,
            MessageBody::PhaseChange(PhaseChangePayload {
                from: transition.from,
                to: transition.to,
                cycle,
                episode: self.world.episode(),
            }),
            PHASE_CHANGE_PRIORITY,
            Some(self.settings.timestamp(cycle)),
        );
    }

    /// Get recent cycle statistics
    pub fn recent_stats(&self) -> &[CycleStats] {
        &self.stats_history
    }

    /// Get average cycle time from recent history
    pub fn average_cycle_time(&self) -> Option<Duration> {
        if self.stats_history.is_empty() {
            return None;
        }

        let total: Duration = self.stats_history.iter().map(|s| s.duration).sum();
        Some(total / self.stats_history.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::WorldGraph;
    use crate::log::MessageKind;
    use crate::world::WorldParams;

    fn scheduler(seed: u64) -> Scheduler {
        Scheduler::new(
            World::new(WorldGraph::karachi().unwrap(), WorldParams::default()),
            MessageLog::default(),
            &AgentConfig::default(),
            seed,
            SchedulerSettings::default(),
        )
    }

    #[test]
    fn idle_cycles_only_count() {
        let mut scheduler = scheduler(1);
        let result = scheduler.run_cycle().unwrap();
        assert_eq!(result.cycle, 1);
        assert!(result.messages.is_empty());
        assert!(result.units.is_empty());
        assert_eq!(result.world.phase, Phase::Idle);
    }

    #[test]
    fn trigger_publishes_phase_change() {
        let mut scheduler = scheduler(2);
        scheduler
            .trigger_disaster(ScenarioKind::Flood, 0.5, None)
            .unwrap();
        let recent = scheduler.log().read_recent(1);
        assert_eq!(recent[0].kind(), MessageKind::PhaseChange);
        assert_eq!(recent[0].sender, "scheduler");
    }

    #[test]
    fn retrigger_mid_rebuild_starts_from_idle() {
        let mut scheduler = scheduler(6);
        scheduler
            .trigger_disaster(ScenarioKind::Earthquake, 0.2, None)
            .unwrap();
        let mut reached_rebuild = false;
        for _ in 0..300 {
            if scheduler.run_cycle().unwrap().world.phase == Phase::Rebuild {
                reached_rebuild = true;
                break;
            }
        }
        assert!(reached_rebuild);

        scheduler
            .trigger_disaster(ScenarioKind::Flood, 0.4, None)
            .unwrap();
        assert_eq!(scheduler.cycle_count(), 0);
        let changes = scheduler.log().read_recent(10);
        assert_eq!(changes.len(), 1);
        match &changes[0].body {
            MessageBody::PhaseChange(change) => {
                assert_eq!((change.from, change.to), (Phase::Idle, Phase::Response));
                assert!(change.from.can_become(change.to));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejected_trigger_leaves_the_run_alone() {
        let mut scheduler = scheduler(7);
        scheduler
            .trigger_disaster(ScenarioKind::Wildfire, 0.5, None)
            .unwrap();
        scheduler.run_cycle().unwrap();
        assert!(scheduler
            .trigger_disaster(ScenarioKind::Flood, 2.0, None)
            .is_err());
        assert_eq!(scheduler.cycle_count(), 1);
        assert_eq!(scheduler.world().phase(), Phase::Response);
    }

    #[test]
    fn response_cycle_runs_agents_in_order() {
        let mut scheduler = scheduler(3);
        scheduler
            .trigger_disaster(ScenarioKind::Earthquake, 0.8, None)
            .unwrap();
        let result = scheduler.run_cycle().unwrap();
        let senders: Vec<&str> = result.messages.iter().map(|m| m.sender.as_str()).collect();
        let alert = senders.iter().position(|s| *s == "alert");
        let recon = senders.iter().position(|s| *s == "recon");
        let allocation = senders.iter().position(|s| *s == "allocation");
        assert!(alert < recon && recon < allocation);
        assert!(result.world.victims_saved > 0);
    }

    #[test]
    fn timestamps_follow_the_cycle_clock() {
        let mut scheduler = scheduler(4);
        scheduler
            .trigger_disaster(ScenarioKind::Earthquake, 0.9, None)
            .unwrap();
        scheduler.run_cycle().unwrap();
        let result = scheduler.run_cycle().unwrap();
        let expected = SchedulerSettings::default().timestamp(2);
        assert!(result.messages.iter().all(|m| m.timestamp == expected));
    }

    #[test]
    fn paused_cycle_is_a_no_op() {
        let mut scheduler = scheduler(5);
        scheduler
            .trigger_disaster(ScenarioKind::Wildfire, 0.6, None)
            .unwrap();
        assert!(scheduler.pause());
        let result = scheduler.run_cycle().unwrap();
        assert!(result.paused);
        assert_eq!(result.cycle, 0);
        assert_eq!(result.world.time_step, 0);
        assert!(!scheduler.resume());
        assert_eq!(scheduler.run_cycle().unwrap().cycle, 1);
    }

    #[test]
    fn run_agent_needs_a_started_cycle() {
        let mut scheduler = scheduler(6);
        assert_eq!(
            scheduler.run_agent(AgentKind::Alert),
            Err(CycleError::NotStarted)
        );
        assert_eq!(scheduler.finish_cycle().unwrap_err(), CycleError::NotStarted);
    }

    #[test]
    fn violation_latches_until_reset() {
        let mut scheduler = scheduler(7);
        scheduler.latch(InvariantViolation::ProgressOutOfRange(120.0));
        assert!(matches!(scheduler.run_cycle(), Err(CycleError::Halted(_))));
        scheduler.reset();
        assert!(scheduler.fault().is_none());
        assert!(scheduler.run_cycle().is_ok());
    }

    #[test]
    fn log_is_pruned_on_interval() {
        let mut scheduler = Scheduler::new(
            World::new(WorldGraph::karachi().unwrap(), WorldParams::default()),
            MessageLog::default(),
            &AgentConfig::default(),
            8,
            SchedulerSettings {
                prune_interval: 2,
                prune_keep: 3,
                ..SchedulerSettings::default()
            },
        );
        scheduler
            .trigger_disaster(ScenarioKind::Earthquake, 1.0, None)
            .unwrap();
        scheduler.run_cycle().unwrap();
        scheduler.run_cycle().unwrap();
        assert!(scheduler.log().len() <= 3);
    }

    #[test]
    fn stats_history_is_bounded() {
        let mut scheduler = Scheduler::new(
            World::new(WorldGraph::karachi().unwrap(), WorldParams::default()),
            MessageLog::default(),
            &AgentConfig::default(),
            9,
            SchedulerSettings {
                max_history: 3,
                ..SchedulerSettings::default()
            },
        );
        for _ in 0..5 {
            scheduler.run_cycle().unwrap();
        }
        let stats = scheduler.recent_stats();
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].cycle, 3);
        assert!(scheduler.average_cycle_time().is_some());
    }
}

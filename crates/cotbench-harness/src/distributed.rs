//! Bootstrap against a multi-process training launcher
//!
//! The launcher contract is the usual one: `WORLD_SIZE`, `RANK` and
//! `LOCAL_RANK` exported per process, plus `MASTER_ADDR` for the group
//! rendezvous. This layer only joins and queries the group; collective
//! communication belongs to the ML framework.

use crate::HarnessError;
use std::collections::HashMap;

/// Process identity within a (possibly single-process) run
///
/// Constructed once by [`init_distributed`] and passed by reference to
/// anything that needs rank-gated behavior. There is no process-wide
/// state; dropping the context forgets the group.
#[derive(Debug, Clone)]
pub struct DistributedContext {
    rank: usize,
    local_rank: Option<usize>,
    world_size: usize,
}

impl DistributedContext {
    /// Context for a plain single-process run
    pub fn single_process() -> Self {
        Self {
            rank: 0,
            local_rank: None,
            world_size: 1,
        }
    }

    /// This process's rank within the group
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Local (per-node) rank, absent when not running distributed
    pub fn local_rank(&self) -> Option<usize> {
        self.local_rank
    }

    /// Number of processes in the group
    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Whether the group spans more than one process
    pub fn is_distributed(&self) -> bool {
        self.world_size > 1
    }

    /// True iff no group is active or this process has rank 0
    ///
    /// Used to gate logging and checkpoint writing so exactly one process
    /// performs I/O side effects.
    pub fn is_main_process(&self) -> bool {
        self.rank == 0
    }
}

/// Join the process group described by the launcher environment
///
/// Single-process mode (no `WORLD_SIZE`, or `WORLD_SIZE <= 1`) always
/// succeeds. In multi-process mode every variable must be present and
/// consistent; any inconsistency is fatal and propagates, with no retry
/// path.
pub fn init_distributed() -> Result<DistributedContext, HarnessError> {
    let env: HashMap<String, String> = std::env::vars().collect();
    init_from_env(&env)
}

/// Environment-explicit variant of [`init_distributed`]
pub fn init_from_env(env: &HashMap<String, String>) -> Result<DistributedContext, HarnessError> {
    let world_size = match env.get("WORLD_SIZE") {
        None => 1,
        Some(raw) => parse_var("WORLD_SIZE", raw)?,
    };

    if world_size <= 1 {
        return Ok(DistributedContext::single_process());
    }

    let rank_raw = env
        .get("RANK")
        .ok_or_else(|| HarnessError::DistributedInit("RANK not set by launcher".to_string()))?;
    let rank = parse_var("RANK", rank_raw)?;

    let local_rank_raw = env.get("LOCAL_RANK").ok_or_else(|| {
        HarnessError::DistributedInit("LOCAL_RANK not set by launcher".to_string())
    })?;
    let local_rank = parse_var("LOCAL_RANK", local_rank_raw)?;

    if rank >= world_size {
        return Err(HarnessError::DistributedInit(format!(
            "RANK {rank} out of range for WORLD_SIZE {world_size}"
        )));
    }
    if !env.contains_key("MASTER_ADDR") {
        return Err(HarnessError::DistributedInit(
            "MASTER_ADDR not set by launcher".to_string(),
        ));
    }

    tracing::info!(rank, local_rank, world_size, "joined process group");
    Ok(DistributedContext {
        rank,
        local_rank: Some(local_rank),
        world_size,
    })
}

fn parse_var(name: &str, raw: &str) -> Result<usize, HarnessError> {
    raw.parse::<usize>().map_err(|_| {
        HarnessError::DistributedInit(format!("{name}=`{raw}` is not a valid integer"))
    })
}

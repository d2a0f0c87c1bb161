//! Fragment task messages and their wire codec.
//!
//! One message carries every fragment that a given partition executes in a
//! given round. The parallel arrays share one index per fragment; the wire
//! layout is big-endian with a u32 fragment count and length-prefixed
//! parameter payloads, so the bytes are stable across hosts.

use crate::catalog::{DependencyId, FragmentId, PartitionId, NULL_DEPENDENCY_ID};
use crate::wire::{read_bytes_at, read_i32_at, read_i64_at, read_u32_at, read_u8_at};

/// Whether the owning stored procedure is a user procedure or a per-partition
/// system procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    UserProc,
    SysProcPerPartition,
}

impl TaskKind {
    fn to_wire(self) -> u8 {
        match self {
            TaskKind::UserProc => 0,
            TaskKind::SysProcPerPartition => 1,
        }
    }

    fn from_wire(value: u8) -> anyhow::Result<Self> {
        match value {
            0 => Ok(TaskKind::UserProc),
            1 => Ok(TaskKind::SysProcPerPartition),
            other => anyhow::bail!("unknown task kind {other}"),
        }
    }
}

/// Unit of work shipped to one execution partition for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentTaskMessage {
    pub target_partition: PartitionId,
    pub initiator_id: i32,
    pub txn_id: i64,
    pub client_handle: i64,
    pub fragment_ids: Vec<FragmentId>,
    /// `NULL_DEPENDENCY_ID` marks fragments with no input dependency.
    pub input_dep_ids: Vec<DependencyId>,
    pub output_dep_ids: Vec<DependencyId>,
    pub stmt_indexes: Vec<i32>,
    pub param_payloads: Vec<Vec<u8>>,
    pub kind: TaskKind,
    pub final_task: bool,
}

impl FragmentTaskMessage {
    pub fn fragment_count(&self) -> usize {
        self.fragment_ids.len()
    }

    /// True when any fragment in the message waits on an input dependency.
    pub fn has_input_dependencies(&self) -> bool {
        self.input_dep_ids
            .iter()
            .any(|&dep| dep != NULL_DEPENDENCY_ID)
    }

    /// Serialize into the wire layout.
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let count = self.fragment_ids.len();
        anyhow::ensure!(
            self.input_dep_ids.len() == count
                && self.output_dep_ids.len() == count
                && self.stmt_indexes.len() == count
                && self.param_payloads.len() == count,
            "fragment task message arrays disagree on fragment count"
        );
        let count = u32::try_from(count)
            .map_err(|_| anyhow::anyhow!("fragment task message exceeds wire count limit"))?;

        let mut out = Vec::with_capacity(26 + count as usize * 24);
        out.extend_from_slice(&self.target_partition.to_be_bytes());
        out.extend_from_slice(&self.initiator_id.to_be_bytes());
        out.extend_from_slice(&self.txn_id.to_be_bytes());
        out.extend_from_slice(&self.client_handle.to_be_bytes());
        out.extend_from_slice(&count.to_be_bytes());
        for id in &self.fragment_ids {
            out.extend_from_slice(&id.to_be_bytes());
        }
        for dep in &self.input_dep_ids {
            out.extend_from_slice(&dep.to_be_bytes());
        }
        for dep in &self.output_dep_ids {
            out.extend_from_slice(&dep.to_be_bytes());
        }
        for index in &self.stmt_indexes {
            out.extend_from_slice(&index.to_be_bytes());
        }
        for payload in &self.param_payloads {
            let len = u32::try_from(payload.len())
                .map_err(|_| anyhow::anyhow!("parameter payload exceeds wire length limit"))?;
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(payload);
        }
        out.push(self.kind.to_wire());
        out.push(u8::from(self.final_task));
        Ok(out)
    }

    /// Decode one serialized message, validating lengths.
    pub fn decode(buf: &[u8]) -> anyhow::Result<FragmentTaskMessage> {
        let mut offset = 0usize;
        let target_partition = read_i32_at(buf, &mut offset)?;
        let initiator_id = read_i32_at(buf, &mut offset)?;
        let txn_id = read_i64_at(buf, &mut offset)?;
        let client_handle = read_i64_at(buf, &mut offset)?;
        let count = read_u32_at(buf, &mut offset)? as usize;

        let mut fragment_ids = Vec::with_capacity(count);
        for _ in 0..count {
            fragment_ids.push(read_i64_at(buf, &mut offset)?);
        }
        let mut input_dep_ids = Vec::with_capacity(count);
        for _ in 0..count {
            input_dep_ids.push(read_i32_at(buf, &mut offset)?);
        }
        let mut output_dep_ids = Vec::with_capacity(count);
        for _ in 0..count {
            output_dep_ids.push(read_i32_at(buf, &mut offset)?);
        }
        let mut stmt_indexes = Vec::with_capacity(count);
        for _ in 0..count {
            stmt_indexes.push(read_i32_at(buf, &mut offset)?);
        }
        let mut param_payloads = Vec::with_capacity(count);
        for _ in 0..count {
            let len = read_u32_at(buf, &mut offset)? as usize;
            param_payloads.push(read_bytes_at(buf, &mut offset, len)?.to_vec());
        }
        let kind = TaskKind::from_wire(read_u8_at(buf, &mut offset)?)?;
        let final_task = match read_u8_at(buf, &mut offset)? {
            0 => false,
            1 => true,
            other => anyhow::bail!("invalid final-task flag {other}"),
        };
        anyhow::ensure!(offset == buf.len(), "trailing bytes after fragment task message");

        Ok(FragmentTaskMessage {
            target_partition,
            initiator_id,
            txn_id,
            client_handle,
            fragment_ids,
            input_dep_ids,
            output_dep_ids,
            stmt_indexes,
            param_payloads,
            kind,
            final_task,
        })
    }
}

//! Pure interval arithmetic for the chunk map.
//!
//! A splice-write installs a new byte range over an inode and must adjust
//! every previously-mapped range it overlaps; a truncation trims or discards
//! every range extending past the new size. Both are computed here as plans
//! over in-memory snapshots of the locked rows, so the store can execute
//! them inside its transaction and the arithmetic stays testable on its own.
//!
//! Invariant preserved by both planners: live intervals of one inode never
//! overlap.

use crate::meta::store::{Chunk, NewChunk};

/// Outcome of resolving a write `[off, off+len)` against the overlapping
/// live chunks of the inode.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct SplicePlan {
    /// Surviving chunks, rewritten in place (trimmed or shifted).
    pub updates: Vec<Chunk>,
    /// Right halves produced by splitting chunks that strictly contain the
    /// write; inserted as new rows.
    pub inserts: Vec<NewChunk>,
    /// Row ids of chunks fully covered by the write.
    pub orphans: Vec<u64>,
}

/// Outcome of truncating an inode down to `new_size`.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct TruncatePlan {
    /// Chunks crossing the boundary, end-trimmed to it.
    pub shrinks: Vec<Chunk>,
    /// Row ids of chunks lying entirely past the boundary.
    pub orphans: Vec<u64>,
}

/// Resolve the write `[off, off+len)` against `overlapping`, which must hold
/// exactly the live chunks whose intervals intersect the write.
pub(crate) fn splice_plan(off: u64, len: u64, overlapping: Vec<Chunk>) -> SplicePlan {
    let end = off + len;
    let mut plan = SplicePlan::default();

    for mut chunk in overlapping {
        let (a, b) = (chunk.inode_offset, chunk.end());

        if a >= off && b <= end {
            plan.orphans.push(chunk.id);
            continue;
        }

        if a < off && b > end {
            // Strict container: the surviving left piece keeps the row, the
            // right piece becomes a new row with its object offset advanced
            // past the written span.
            plan.inserts.push(NewChunk {
                storage: chunk.storage.clone(),
                key: chunk.key.clone(),
                object_offset: chunk.object_offset + (end - a),
                inode_offset: end,
                size: b - end,
            });
        }

        let (new_off, new_end) = if a < off { (a, off) } else { (end, b) };
        chunk.object_offset += new_off - a;
        chunk.inode_offset = new_off;
        chunk.size = new_end - new_off;
        plan.updates.push(chunk);
    }

    plan
}

/// Trim `affected` down to `new_size`; `affected` must hold exactly the live
/// chunks whose intervals extend past it.
pub(crate) fn truncate_plan(new_size: u64, affected: Vec<Chunk>) -> TruncatePlan {
    let mut plan = TruncatePlan::default();

    for mut chunk in affected {
        if chunk.inode_offset < new_size {
            chunk.size = new_size - chunk.inode_offset;
            plan.shrinks.push(chunk);
        } else {
            plan.orphans.push(chunk.id);
        }
    }

    plan
}

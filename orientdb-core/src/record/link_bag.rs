//! Link bags: large link collections stored inline or in a server-side tree.
//!
//! Only the embedded layout and the plain tree pointer are understood. The
//! UUID-tagged layout is rejected with `NotImplemented`.

use crate::error::{OrientError, Result};
use crate::record::{Link, Rid};
use crate::serialization::{DataInput, DataOutput};

const CONFIG_EMBEDDED: u8 = 0x01;
const CONFIG_UUID: u8 = 0x02;

/// Kind of a pending change recorded against a tree-based link bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The link count was changed by a delta.
    Diff,
    /// The link count was set to an absolute value.
    Absolute,
}

impl ChangeKind {
    fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(Self::Diff),
            1 => Ok(Self::Absolute),
            other => Err(OrientError::CorruptStream(format!(
                "unknown link bag change type: {}",
                other
            ))),
        }
    }

    fn id(self) -> u8 {
        match self {
            Self::Diff => 0,
            Self::Absolute => 1,
        }
    }
}

/// A pending change the server reports alongside a tree-based bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBagChange {
    /// Record the change applies to.
    pub rid: Rid,
    /// How `value` is applied.
    pub kind: ChangeKind,
    /// Delta or absolute count.
    pub value: i32,
}

/// Pointer to a link bag stored as a B-tree on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLinkBag {
    /// Server-side file holding the tree.
    pub file_id: i64,
    /// Root page index.
    pub page_index: i64,
    /// Root offset within the page.
    pub page_offset: i32,
    /// Number of links, as last reported by the server.
    pub size: i32,
    /// Changes not yet folded into the tree.
    pub changes: Vec<LinkBagChange>,
}

/// A link bag as carried in a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkBag {
    /// Links stored inline in the record.
    Embedded(Vec<Link>),
    /// Links stored in a server-side tree; only the pointer is carried.
    Tree(TreeLinkBag),
}

impl LinkBag {
    /// Returns the number of links in the bag.
    pub fn len(&self) -> usize {
        match self {
            Self::Embedded(links) => links.len(),
            Self::Tree(tree) => tree.size.max(0) as usize,
        }
    }

    /// Returns true if the bag holds no links.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn write<W: DataOutput + ?Sized>(&self, out: &mut W) -> Result<()> {
        match self {
            Self::Embedded(links) => {
                out.write_byte(CONFIG_EMBEDDED as i8)?;
                out.write_int(len_i32(links.len())?)?;
                for link in links {
                    out.write_short(link.rid().cluster_id)?;
                    out.write_long(link.rid().cluster_position)?;
                }
            }
            Self::Tree(tree) => {
                out.write_byte(0)?;
                out.write_long(tree.file_id)?;
                out.write_long(tree.page_index)?;
                out.write_int(tree.page_offset)?;
                out.write_int(tree.size)?;
                out.write_int(len_i32(tree.changes.len())?)?;
                for change in &tree.changes {
                    out.write_short(change.rid.cluster_id)?;
                    out.write_long(change.rid.cluster_position)?;
                    out.write_byte(change.kind.id() as i8)?;
                    out.write_int(change.value)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn read<R: DataInput + ?Sized>(input: &mut R) -> Result<Self> {
        let config = input.read_byte()? as u8;
        if config & CONFIG_UUID != 0 {
            return Err(OrientError::NotImplemented(
                "UUID-tagged link bags".to_string(),
            ));
        }

        if config & CONFIG_EMBEDDED != 0 {
            let size = read_count(input)?;
            let mut links = Vec::with_capacity(size.min(1024));
            for _ in 0..size {
                links.push(Link::new(read_rid(input)?));
            }
            return Ok(Self::Embedded(links));
        }

        let file_id = input.read_long()?;
        let page_index = input.read_long()?;
        let page_offset = input.read_int()?;
        let size = input.read_int()?;
        let change_count = read_count(input)?;
        let mut changes = Vec::with_capacity(change_count.min(1024));
        for _ in 0..change_count {
            let rid = read_rid(input)?;
            let kind = ChangeKind::from_id(input.read_byte()? as u8)?;
            let value = input.read_int()?;
            changes.push(LinkBagChange { rid, kind, value });
        }
        Ok(Self::Tree(TreeLinkBag {
            file_id,
            page_index,
            page_offset,
            size,
            changes,
        }))
    }
}

fn read_rid<R: DataInput + ?Sized>(input: &mut R) -> Result<Rid> {
    let cluster_id = input.read_short()?;
    let cluster_position = input.read_long()?;
    Ok(Rid::new(cluster_id, cluster_position))
}

fn read_count<R: DataInput + ?Sized>(input: &mut R) -> Result<usize> {
    let count = input.read_int()?;
    usize::try_from(count)
        .map_err(|_| OrientError::CorruptStream(format!("negative link bag size: {}", count)))
}

fn len_i32(len: usize) -> Result<i32> {
    i32::try_from(len)
        .map_err(|_| OrientError::Serialization(format!("link bag too large: {}", len)))
}

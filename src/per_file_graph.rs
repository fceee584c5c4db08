//! Reader/writer for one per-file dependency artifact: a binary
//! container with signature `"DEPS"` and a single record block (§4.1/§6).
//!
//! Integer fields are unsigned LEB128; blobs are length-prefixed UTF-8.
//! The identifier pool is zero-based with `pool[0] == ""` implicit.
//! Parsing is strict: one malformed record fails the whole file.

use crate::{
    dep_key::{Aspect, DependencyKey, Designator},
    error::{Error, Result},
};

const SIGNATURE: &[u8; 4] = b"DEPS";
const RECORD_BLOCK_ID: u64 = 8;

const KIND_METADATA: u8 = 1;
const KIND_NODE: u8 = 2;
const KIND_FINGERPRINT: u8 = 3;
const KIND_DEPENDS_ON: u8 = 4;
const KIND_IDENTIFIER: u8 = 5;

fn aspect_code(aspect: Aspect) -> u8 {
    match aspect {
        Aspect::Interface => 0,
        Aspect::Implementation => 1,
    }
}

fn aspect_from_code(code: u8) -> Result<Aspect> {
    match code {
        0 => Ok(Aspect::Interface),
        1 => Ok(Aspect::Implementation),
        other => Err(Error::msg(format!("malformed_node_record: unknown aspect_code {other}"))),
    }
}

/// One `source_file_dep_graph_node` plus the records attached to it
/// (fingerprint, depends_on). `depends_on` holds sequence numbers into
/// the containing [`PerFileGraph::nodes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerFileNode {
    pub key: DependencyKey,
    pub is_provides: bool,
    pub fingerprint: Option<String>,
    pub depends_on: Vec<u32>,
}

/// The parsed contents of one per-file dependency artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerFileGraph {
    pub major: u64,
    pub minor: u64,
    pub compiler_version: String,
    pub nodes: Vec<PerFileNode>,
}

impl PerFileGraph {
    /// The post-parse check (§4.1): sequence 0 is `source_file_provide`
    /// interface, sequence 1 is the same designator's implementation.
    pub fn verify_header_nodes(&self) -> Result<()> {
        let n0 = self
            .nodes
            .first()
            .ok_or_else(|| Error::msg("per-file graph has no nodes"))?;
        if !matches!(n0.key.designator, Designator::SourceFileProvide { .. }) || n0.key.aspect != Aspect::Interface {
            return Err(Error::msg("node 0 must be source_file_provide(interface)"));
        }
        let n1 = self
            .nodes
            .get(1)
            .ok_or_else(|| Error::msg("per-file graph is missing the implementation header node"))?;
        if n1.key.designator != n0.key.designator || n1.key.aspect != Aspect::Implementation {
            return Err(Error::msg("node 1 must be source_file_provide(implementation) matching node 0"));
        }
        Ok(())
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn read_u8(&mut self) -> Result<u8> {
        let b = *self.bytes.get(self.pos).ok_or_else(|| Error::msg("unexpected end of file"))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::msg("unexpected end of file"));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Unsigned LEB128.
    fn read_varint(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            result |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 64 {
                return Err(Error::msg("malformed varint"));
            }
        }
        Ok(result)
    }

    fn read_blob(&mut self) -> Result<String> {
        let len = self.read_varint()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::msg(format!("blob is not valid utf-8: {e}")))
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn write_blob(out: &mut Vec<u8>, s: &str) {
    write_varint(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

fn designator_from_kind_code(
    kind_code: u8,
    context: String,
    name: String,
) -> Result<Designator> {
    let (context_is_empty, name_is_empty) = (context.is_empty(), name.is_empty());
    let designator = match kind_code {
        0 => {
            if !context_is_empty {
                return Err(Error::msg("bogus_name_or_context: top_level with non-empty context"));
            }
            Designator::TopLevel { name }
        }
        1 => {
            if !name_is_empty {
                return Err(Error::msg("bogus_name_or_context: nominal with non-empty name"));
            }
            Designator::Nominal { context }
        }
        2 => {
            if !name_is_empty {
                return Err(Error::msg("bogus_name_or_context: potential_member with non-empty name"));
            }
            Designator::PotentialMember { context }
        }
        3 => Designator::Member { context, name },
        4 => {
            if !context_is_empty {
                return Err(Error::msg("bogus_name_or_context: dynamic_lookup with non-empty context"));
            }
            Designator::DynamicLookup { name }
        }
        5 => {
            if !context_is_empty {
                return Err(Error::msg("bogus_name_or_context: external_depend with non-empty context"));
            }
            Designator::ExternalDepend { filename: name }
        }
        6 => {
            if !context_is_empty {
                return Err(Error::msg("bogus_name_or_context: source_file_provide with non-empty context"));
            }
            Designator::SourceFileProvide { name }
        }
        other if other >= 7 => return Err(Error::msg(format!("unknown_kind: {other}"))),
        other => return Err(Error::msg(format!("unknown_kind: {other}"))),
    };
    Ok(designator)
}

/// Reads one per-file dependency artifact from `bytes`.
#[tracing::instrument(skip_all)]
pub fn read(bytes: &[u8]) -> Result<PerFileGraph> {
    let mut reader = Reader::new(bytes);
    if reader.read_bytes(4)? != SIGNATURE {
        return Err(Error::msg("bad_magic"));
    }
    let block_id = reader.read_varint()?;
    if block_id != RECORD_BLOCK_ID {
        return Err(Error::msg(format!("unexpected_subblock: block id {block_id}")));
    }
    let block_len = reader.read_varint()? as usize;
    if reader.remaining() < block_len {
        return Err(Error::msg("malformed_metadata_record: block length exceeds file"));
    }
    let block_end = reader.pos + block_len;

    let mut pool: Vec<String> = vec![String::new()];
    let mut major = None;
    let mut minor = None;
    let mut compiler_version = None;
    let mut nodes: Vec<PerFileNode> = Vec::new();

    while reader.pos < block_end {
        let kind = reader.read_u8()?;
        match kind {
            KIND_METADATA => {
                if major.is_some() {
                    return Err(Error::msg("malformed_metadata_record: duplicate metadata record"));
                }
                major = Some(reader.read_varint().map_err(|_| Error::msg("malformed_metadata_record"))?);
                minor = Some(reader.read_varint().map_err(|_| Error::msg("malformed_metadata_record"))?);
                compiler_version =
                    Some(reader.read_blob().map_err(|_| Error::msg("malformed_metadata_record"))?);
            }
            KIND_NODE => {
                let kind_code = reader.read_u8().map_err(|_| Error::msg("malformed_node_record"))?;
                let aspect_byte = reader.read_u8().map_err(|_| Error::msg("malformed_node_record"))?;
                let aspect = aspect_from_code(aspect_byte)?;
                let context_idx = reader.read_varint().map_err(|_| Error::msg("malformed_node_record"))? as usize;
                let name_idx = reader.read_varint().map_err(|_| Error::msg("malformed_node_record"))? as usize;
                let is_provides_byte = reader.read_u8().map_err(|_| Error::msg("malformed_node_record"))?;
                let context = pool
                    .get(context_idx)
                    .ok_or_else(|| Error::msg("malformed_node_record: context identifier out of range"))?
                    .clone();
                let name = pool
                    .get(name_idx)
                    .ok_or_else(|| Error::msg("malformed_node_record: name identifier out of range"))?
                    .clone();
                let designator = designator_from_kind_code(kind_code, context, name)?;
                let key = DependencyKey::new(aspect, designator);
                nodes.push(PerFileNode {
                    key,
                    is_provides: is_provides_byte != 0,
                    fingerprint: None,
                    depends_on: Vec::new(),
                });
            }
            KIND_FINGERPRINT => {
                let blob = reader.read_blob().map_err(|_| Error::msg("malformed_fingerprint_record"))?;
                let node = nodes
                    .last_mut()
                    .ok_or_else(|| Error::msg("malformed_fingerprint_record: no preceding node"))?;
                node.fingerprint = Some(blob);
            }
            KIND_DEPENDS_ON => {
                let seq = reader.read_varint().map_err(|_| Error::msg("malformed_depends_on_definition_record"))?;
                let node = nodes
                    .last_mut()
                    .ok_or_else(|| Error::msg("malformed_depends_on_definition_record: no preceding node"))?;
                node.depends_on.push(seq as u32);
            }
            KIND_IDENTIFIER => {
                let blob = reader.read_blob().map_err(|_| Error::msg("malformed_identifier_record"))?;
                pool.push(blob);
            }
            other => return Err(Error::msg(format!("unknown_kind: record kind {other}"))),
        }
    }

    let major = major.ok_or_else(|| Error::msg("malformed_metadata_record: missing metadata"))?;
    let minor = minor.unwrap_or(0);
    let compiler_version = compiler_version.unwrap_or_default();

    let graph = PerFileGraph { major, minor, compiler_version, nodes };
    graph.verify_header_nodes()?;
    Ok(graph)
}

/// Writes `graph` back out to its binary container form, the exact
/// inverse of [`read`] (used to build fixtures and round-trip tests).
#[tracing::instrument(skip_all)]
pub fn write(graph: &PerFileGraph) -> Vec<u8> {
    let mut block = Vec::new();

    block.push(KIND_METADATA);
    write_varint(&mut block, graph.major);
    write_varint(&mut block, graph.minor);
    write_blob(&mut block, &graph.compiler_version);

    let mut pool: Vec<String> = vec![String::new()];
    let mut pool_index = |block: &mut Vec<u8>, s: &str| -> usize {
        if let Some(idx) = pool.iter().position(|existing| existing == s) {
            return idx;
        }
        block.push(KIND_IDENTIFIER);
        write_blob(block, s);
        pool.push(s.to_string());
        pool.len() - 1
    };

    for node in &graph.nodes {
        let (context, name): (&str, &str) = match &node.key.designator {
            Designator::TopLevel { name }
            | Designator::DynamicLookup { name }
            | Designator::SourceFileProvide { name }
            | Designator::ExternalDepend { filename: name } => ("", name),
            Designator::Nominal { context } | Designator::PotentialMember { context } => (context, ""),
            Designator::Member { context, name } => (context, name),
        };
        let context_idx = pool_index(&mut block, context);
        let name_idx = pool_index(&mut block, name);

        block.push(KIND_NODE);
        block.push(node.key.designator.kind_code());
        block.push(aspect_code(node.key.aspect));
        write_varint(&mut block, context_idx as u64);
        write_varint(&mut block, name_idx as u64);
        block.push(node.is_provides as u8);

        if let Some(fp) = &node.fingerprint {
            block.push(KIND_FINGERPRINT);
            write_blob(&mut block, fp);
        }
        for seq in &node.depends_on {
            block.push(KIND_DEPENDS_ON);
            write_varint(&mut block, *seq as u64);
        }
    }

    let mut out = Vec::new();
    out.extend_from_slice(SIGNATURE);
    write_varint(&mut out, RECORD_BLOCK_ID);
    write_varint(&mut out, block.len() as u64);
    out.extend_from_slice(&block);
    out
}

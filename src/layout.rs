//! Declarative record layouts. Each on-disk record (an ELF program header, a PE debug
//! directory entry, ...) is described once by a [`Descriptor`]: an ordered list of fields with
//! a kind and an optional architecture tag. A [`LayoutManager`] turns a descriptor into concrete
//! offsets for one architecture (pointer width plus tags like "64BIT" or "PE32+") so the same
//! descriptor serves both 32 and 64-bit containers.
//!
//! Fields are placed C style: natural alignment capped at 8 bytes and the total size rounded
//! up to the largest alignment. Layouts are computed once per (descriptor, architecture) and
//! shared process wide.
use crate::error::{FormatError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, RwLock};

const PACK: u64 = 8;

#[derive(Clone, Copy, Debug)]
pub enum FieldKind {
    U8,
    U16,
    U32,
    U64,
    I16,
    I32,
    I64,

    /// Pointer sized unsigned integer, 4 or 8 bytes depending on the architecture.
    SizeT,

    /// Fixed size byte array.
    Bytes(usize),

    /// Fixed size array of UTF-16 code units.
    Chars(usize),

    /// A nested record (not a pointer to one).
    Struct(&'static Descriptor),
}

#[derive(Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,

    /// The field only exists when the layout manager has this tag.
    pub condition: Option<&'static str>,
}

#[derive(Debug)]
pub struct Descriptor {
    /// Also the cache key so these must be unique.
    pub name: &'static str,
    pub fields: &'static [FieldDef],
}

/// Builds a `&'static Descriptor`, e.g.
/// ```ignore
/// descriptor!("ElfProgramHeader" {
///     "Type": U32,
///     "Flags": U32 if "64BIT",
///     "Offset": SizeT,
/// })
/// ```
macro_rules! descriptor {
    (@tag) => {
        None
    };
    (@tag $tag:literal) => {
        Some($tag)
    };
    ($name:literal { $( $field:literal : $kind:ident $(($arg:expr))? $(if $tag:literal)? ),* $(,)? }) => {
        &$crate::layout::Descriptor {
            name: $name,
            fields: &[$(
                $crate::layout::FieldDef {
                    name: $field,
                    kind: $crate::layout::FieldKind::$kind $(($arg))?,
                    condition: $crate::layout::descriptor!(@tag $($tag)?),
                }
            ),*],
        }
    };
}
pub(crate) use descriptor;

/// A record type that can be decoded from the bytes described by its descriptor.
pub trait Struct: Sized {
    const DESCRIPTOR: &'static Descriptor;

    fn from_record(record: &Record) -> Result<Self>;
}

#[derive(Debug)]
pub struct FieldLayout {
    pub name: &'static str,
    pub kind: FieldKind,
    pub offset: u64,
    pub size: u64,
    nested: Option<Arc<Layout>>,
}

#[derive(Debug)]
pub struct Layout {
    pub name: &'static str,
    pub size: u64,
    pub alignment: u64,
    pub fields: Vec<FieldLayout>,
}

impl Layout {
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Architecture parameters used to lay out and decode records.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LayoutManager {
    big_endian: bool,
    pointer_size: u64,
    tags: Vec<&'static str>,
}

type LayoutKey = (&'static str, u64, String);

static LAYOUTS: LazyLock<RwLock<HashMap<LayoutKey, Arc<Layout>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

impl Default for LayoutManager {
    /// Little endian with 8-byte pointers and no tags. Enough for the fixed size records read
    /// before the real architecture is known.
    fn default() -> Self {
        LayoutManager::new(false, 8)
    }
}

impl LayoutManager {
    pub fn new(big_endian: bool, pointer_size: u64) -> Self {
        LayoutManager {
            big_endian,
            pointer_size,
            tags: Vec::new(),
        }
    }

    pub fn elf(big_endian: bool, is_64bit: bool) -> Self {
        if is_64bit {
            LayoutManager::new(big_endian, 8).with_tag("64BIT")
        } else {
            LayoutManager::new(big_endian, 4).with_tag("32BIT")
        }
    }

    pub fn pe(is_64bit: bool) -> Self {
        if is_64bit {
            LayoutManager::new(false, 8).with_tag("PE32+")
        } else {
            LayoutManager::new(false, 4).with_tag("PE32")
        }
    }

    pub fn with_tag(mut self, tag: &'static str) -> Self {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
            self.tags.sort_unstable();
        }
        self
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn pointer_size(&self) -> u64 {
        self.pointer_size
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| *t == tag)
    }

    pub fn layout(&self, descriptor: &'static Descriptor) -> Result<Arc<Layout>> {
        let key = (descriptor.name, self.pointer_size, self.tags.join(","));
        {
            let cache = LAYOUTS.read().unwrap_or_else(|e| e.into_inner());
            if let Some(layout) = cache.get(&key) {
                return Ok(layout.clone());
            }
        }

        // Computed outside the lock because nested records recurse into this function. Two
        // threads may both compute a layout but the results are identical.
        let layout = Arc::new(self.compute(descriptor)?);
        let mut cache = LAYOUTS.write().unwrap_or_else(|e| e.into_inner());
        Ok(cache.entry(key).or_insert(layout).clone())
    }

    pub fn size_of(&self, descriptor: &'static Descriptor) -> Result<u64> {
        Ok(self.layout(descriptor)?.size)
    }

    fn compute(&self, descriptor: &'static Descriptor) -> Result<Layout> {
        if self.pointer_size != 4 && self.pointer_size != 8 {
            return Err(FormatError::Layout(format!(
                "unsupported pointer size {} for {}",
                self.pointer_size, descriptor.name
            )));
        }

        let mut fields = Vec::with_capacity(descriptor.fields.len());
        let mut offset = 0;
        let mut biggest_alignment = 1;
        for def in descriptor.fields.iter() {
            if let Some(tag) = def.condition
                && !self.has_tag(tag)
            {
                continue;
            }

            let mut nested = None;
            let (size, alignment) = match def.kind {
                FieldKind::U8 => (1, 1),
                FieldKind::U16 | FieldKind::I16 => (2, 2),
                FieldKind::U32 | FieldKind::I32 => (4, 4),
                FieldKind::U64 | FieldKind::I64 => (8, 8),
                FieldKind::SizeT => (self.pointer_size, self.pointer_size),
                FieldKind::Bytes(n) => (n as u64, 1),
                FieldKind::Chars(n) => (2 * n as u64, 2),
                FieldKind::Struct(inner) => {
                    let layout = self.layout(inner)?;
                    let result = (layout.size, layout.alignment);
                    nested = Some(layout);
                    result
                }
            };
            let alignment = alignment.min(PACK);
            biggest_alignment = biggest_alignment.max(alignment);
            offset = align_up(offset, alignment);
            fields.push(FieldLayout {
                name: def.name,
                kind: def.kind,
                offset,
                size,
                nested,
            });
            offset += size;
        }

        // As with C, a zero sized record isn't allowed.
        let size = align_up(offset, biggest_alignment).max(1);
        Ok(Layout {
            name: descriptor.name,
            size,
            alignment: biggest_alignment,
            fields,
        })
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// The raw bytes of one record plus the layout needed to pull fields out of it.
#[derive(Clone)]
pub struct Record {
    layout: Arc<Layout>,
    bytes: Vec<u8>,
    big_endian: bool,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("layout", &self.layout.name)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl Record {
    /// `bytes` must be exactly `layout.size` long.
    pub fn new(layout: Arc<Layout>, bytes: Vec<u8>, big_endian: bool) -> Result<Self> {
        if bytes.len() as u64 != layout.size {
            return Err(FormatError::Layout(format!(
                "{} needs {} bytes but got {}",
                layout.name,
                layout.size,
                bytes.len()
            )));
        }
        Ok(Record {
            layout,
            bytes,
            big_endian,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn u8(&self, name: &str) -> Result<u8> {
        let field = self.expect(name, "u8", |k| matches!(k, FieldKind::U8))?;
        Ok(self.slice(field)[0])
    }

    pub fn u16(&self, name: &str) -> Result<u16> {
        let field = self.expect(name, "u16", |k| matches!(k, FieldKind::U16))?;
        Ok(self.uint(field) as u16)
    }

    pub fn u32(&self, name: &str) -> Result<u32> {
        let field = self.expect(name, "u32", |k| matches!(k, FieldKind::U32))?;
        Ok(self.uint(field) as u32)
    }

    /// Any unsigned integer field (including `SizeT`) widened to 64 bits.
    pub fn u64(&self, name: &str) -> Result<u64> {
        let field = self.expect(name, "an unsigned integer", |k| {
            matches!(
                k,
                FieldKind::U8 | FieldKind::U16 | FieldKind::U32 | FieldKind::U64 | FieldKind::SizeT
            )
        })?;
        Ok(self.uint(field))
    }

    pub fn i16(&self, name: &str) -> Result<i16> {
        let field = self.expect(name, "i16", |k| matches!(k, FieldKind::I16))?;
        Ok(self.uint(field) as u16 as i16)
    }

    pub fn i32(&self, name: &str) -> Result<i32> {
        let field = self.expect(name, "i32", |k| matches!(k, FieldKind::I32))?;
        Ok(self.uint(field) as u32 as i32)
    }

    pub fn i64(&self, name: &str) -> Result<i64> {
        let field = self.expect(name, "i64", |k| matches!(k, FieldKind::I64))?;
        Ok(self.uint(field) as i64)
    }

    pub fn size_t(&self, name: &str) -> Result<u64> {
        let field = self.expect(name, "size_t", |k| matches!(k, FieldKind::SizeT))?;
        Ok(self.uint(field))
    }

    pub fn bytes(&self, name: &str) -> Result<&[u8]> {
        let field = self.expect(name, "a byte array", |k| matches!(k, FieldKind::Bytes(_)))?;
        Ok(self.slice(field))
    }

    /// Fixed UTF-16 array decoded up to the first nul.
    pub fn chars(&self, name: &str) -> Result<String> {
        let field = self.expect(name, "a char array", |k| matches!(k, FieldKind::Chars(_)))?;
        let units: Vec<u16> = self
            .slice(field)
            .chunks_exact(2)
            .map(|c| {
                if self.big_endian {
                    u16::from_be_bytes([c[0], c[1]])
                } else {
                    u16::from_le_bytes([c[0], c[1]])
                }
            })
            .take_while(|u| *u != 0)
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }

    pub fn record(&self, name: &str) -> Result<Record> {
        let field = self.expect(name, "a record", |k| matches!(k, FieldKind::Struct(_)))?;
        let layout = field
            .nested
            .clone()
            .ok_or_else(|| FormatError::Layout(format!("{name} has no nested layout")))?;
        Record::new(layout, self.slice(field).to_vec(), self.big_endian)
    }

    /// Decodes a nested record field.
    pub fn get<T: Struct>(&self, name: &str) -> Result<T> {
        T::from_record(&self.record(name)?)
    }

    fn expect(
        &self,
        name: &str,
        wanted: &str,
        predicate: impl Fn(&FieldKind) -> bool,
    ) -> Result<&FieldLayout> {
        let field = self.layout.field(name).ok_or_else(|| {
            FormatError::Layout(format!("{} has no {name} field", self.layout.name))
        })?;
        if !predicate(&field.kind) {
            return Err(FormatError::Layout(format!(
                "{}.{name} is {:?}, not {wanted}",
                self.layout.name, field.kind
            )));
        }
        Ok(field)
    }

    fn slice(&self, field: &FieldLayout) -> &[u8] {
        let start = field.offset as usize;
        &self.bytes[start..start + field.size as usize]
    }

    fn uint(&self, field: &FieldLayout) -> u64 {
        decode_uint(self.slice(field), self.big_endian)
    }
}

/// Decodes an unsigned integer of 1 to 8 bytes.
pub fn decode_uint(bytes: &[u8], big_endian: bool) -> u64 {
    if big_endian {
        bytes.iter().fold(0, |acc, b| (acc << 8) | *b as u64)
    } else {
        bytes.iter().rev().fold(0, |acc, b| (acc << 8) | *b as u64)
    }
}

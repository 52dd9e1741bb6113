use crate::access::schema::Schema;
use crate::access::tuple::{RecordId, Tuple};
use crate::error::{DbError, DbResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use bytes::Bytes;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

/// Geometry of a heap page for a given page size and tuple width.
///
/// A page holds `header_len` bytes of occupancy bitmap followed by `num_slots`
/// fixed-width slots; whatever is left at the end is zero padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    page_size: usize,
    tuple_size: usize,
    num_slots: usize,
    header_len: usize,
}

impl PageLayout {
    pub fn new(page_size: usize, tuple_size: usize) -> Self {
        // Each slot costs its tuple bits plus one header bit.
        let mut num_slots = ((page_size * 8) / (tuple_size * 8 + 1)).min(u16::MAX as usize);
        // Rounding the header up to whole bytes can push the last slot past the end.
        while num_slots > 0 && num_slots.div_ceil(8) + num_slots * tuple_size > page_size {
            num_slots -= 1;
        }
        Self {
            page_size,
            tuple_size,
            num_slots,
            header_len: num_slots.div_ceil(8),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    fn slot_offset(&self, slot: usize) -> usize {
        self.header_len + slot * self.tuple_size
    }
}

/// Decoded in-memory view of one slotted heap page.
pub struct HeapPage {
    page_id: PageId,
    schema: Arc<Schema>,
    layout: PageLayout,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirtied_by: Option<TransactionId>,
    before_image: Bytes,
}

impl HeapPage {
    /// Decodes `data`, which must be exactly one page long.
    pub fn from_bytes(
        page_id: PageId,
        schema: Arc<Schema>,
        page_size: usize,
        data: &[u8],
    ) -> DbResult<Self> {
        if data.len() != page_size {
            return Err(DbError::CorruptPage {
                page_id,
                reason: format!("expected {} bytes, got {}", page_size, data.len()),
            });
        }

        let layout = PageLayout::new(page_size, schema.byte_size());
        let header = data[..layout.header_len()].to_vec();
        let mut tuples = Vec::with_capacity(layout.num_slots());

        for slot in 0..layout.num_slots() {
            if !bit_is_set(&header, slot) {
                tuples.push(None);
                continue;
            }
            let start = layout.slot_offset(slot);
            let mut cursor = Cursor::new(&data[start..start + layout.tuple_size()]);
            let mut tuple = Tuple::deserialize(schema.clone(), &mut cursor).map_err(|e| {
                DbError::CorruptPage {
                    page_id,
                    reason: format!("slot {slot}: {e}"),
                }
            })?;
            tuple.set_record_id(Some(RecordId::new(page_id, slot as u16)));
            tuples.push(Some(tuple));
        }

        Ok(Self {
            page_id,
            schema,
            layout,
            header,
            tuples,
            dirtied_by: None,
            before_image: Bytes::copy_from_slice(data),
        })
    }

    /// A page with every slot free.
    pub fn empty(page_id: PageId, schema: Arc<Schema>, page_size: usize) -> DbResult<Self> {
        Self::from_bytes(page_id, schema, page_size, &Self::empty_page_data(page_size))
    }

    /// The on-disk image of a page with no tuples: all zeros.
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0u8; page_size]
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    pub fn slot_count(&self) -> usize {
        self.layout.num_slots()
    }

    /// Encodes the page; the inverse of [`HeapPage::from_bytes`].
    pub fn page_data(&self) -> DbResult<Vec<u8>> {
        let mut data = Vec::with_capacity(self.layout.page_size());
        data.extend_from_slice(&self.header);

        for slot in &self.tuples {
            match slot {
                Some(tuple) => tuple.serialize(&mut data)?,
                None => data.resize(data.len() + self.layout.tuple_size(), 0),
            }
        }

        data.resize(self.layout.page_size(), 0);
        Ok(data)
    }

    /// Returns a page decoded from the snapshot taken when this page was loaded or last
    /// committed, without touching disk.
    pub fn before_image(&self) -> DbResult<HeapPage> {
        Self::from_bytes(
            self.page_id,
            self.schema.clone(),
            self.layout.page_size(),
            &self.before_image,
        )
    }

    /// Starts a new mutation epoch: the current content becomes the before image.
    pub fn set_before_image(&mut self) -> DbResult<()> {
        self.before_image = Bytes::from(self.page_data()?);
        Ok(())
    }

    /// Places `tuple` in the lowest free slot and records its new location on it.
    pub fn insert(&mut self, tuple: &mut Tuple) -> DbResult<RecordId> {
        if tuple.schema().as_ref() != self.schema.as_ref() {
            return Err(DbError::SchemaMismatch {
                expected: self.schema.to_string(),
                found: tuple.schema().to_string(),
            });
        }
        let slot = (0..self.slot_count())
            .find(|&i| !self.is_slot_used(i))
            .ok_or(DbError::PageFull(self.page_id))?;

        // Reject values that cannot be encoded before the slot is claimed.
        let mut scratch = Vec::with_capacity(self.layout.tuple_size());
        tuple.serialize(&mut scratch)?;

        let record_id = RecordId::new(self.page_id, slot as u16);
        tuple.set_record_id(Some(record_id));
        self.tuples[slot] = Some(tuple.clone());
        self.set_slot(slot, true);
        Ok(record_id)
    }

    pub fn delete(&mut self, tuple: &Tuple) -> DbResult<()> {
        let record_id = tuple
            .record_id()
            .filter(|rid| rid.page_id == self.page_id)
            .ok_or(DbError::NotOnThisPage {
                page_id: self.page_id,
            })?;
        let slot = record_id.slot as usize;
        if !self.is_slot_used(slot) {
            return Err(DbError::SlotAlreadyEmpty {
                page_id: self.page_id,
                slot: record_id.slot,
            });
        }
        self.tuples[slot] = None;
        self.set_slot(slot, false);
        Ok(())
    }

    /// Records `tid` as the transaction that dirtied this page, or marks it clean.
    pub fn mark_dirty(&mut self, dirty: bool, tid: TransactionId) {
        self.dirtied_by = if dirty { Some(tid) } else { None };
    }

    /// The transaction that dirtied this page, `None` when clean.
    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.slot_count() && bit_is_set(&self.header, slot)
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.slot_count())
            .filter(|&i| !self.is_slot_used(i))
            .count()
    }

    pub fn tuple(&self, slot: usize) -> Option<&Tuple> {
        self.tuples.get(slot).and_then(Option::as_ref)
    }

    /// Occupied tuples in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().flatten()
    }

    fn set_slot(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.header[slot / 8] |= mask;
        } else {
            self.header[slot / 8] &= !mask;
        }
    }
}

fn bit_is_set(header: &[u8], slot: usize) -> bool {
    header[slot / 8] & (1 << (slot % 8)) != 0
}

/// Pages compare by identity, occupancy and tuple content; dirty state and the before
/// image are bookkeeping and ignored.
impl PartialEq for HeapPage {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id
            && self.header == other.header
            && self.tuples.len() == other.tuples.len()
            && self.tuples.iter().zip(&other.tuples).all(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => a == b && a.record_id() == b.record_id(),
                (None, None) => true,
                _ => false,
            })
    }
}

impl fmt::Debug for HeapPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapPage")
            .field("page_id", &self.page_id)
            .field("slots", &self.slot_count())
            .field("used", &(self.slot_count() - self.num_empty_slots()))
            .field("dirtied_by", &self.dirtied_by)
            .finish()
    }
}

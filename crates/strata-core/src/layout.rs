//! Compile-time layout planning for structure-of-arrays blocks.
//!
//! A block of capacity `n` stores every field as its own array of `n`
//! elements. Arrays are placed in *slots* ordered by non-increasing element
//! size, so the array of a field starts at
//!
//! ```text
//! base + offset(field) * capacity
//! ```
//!
//! where `offset(field)` is the summed size of every field in an earlier
//! slot. When element sizes are powers of two this places every array at a
//! multiple of its alignment without any padding; [`Plan::new`] rejects
//! field lists for which that does not hold.
//!
//! Fields of equal size keep their declaration order. Two field lists with
//! the same sorted sizes therefore map slot for slot, which is what makes a
//! cast view between them well defined.

/// Largest number of fields in one field list.
pub const MAX_FIELDS: usize = 12;

/// Byte layout of one field list.
///
/// Built once per field list in a constant context; every query is a
/// table lookup. Field indices are declaration indices; slot indices are
/// physical positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Plan {
    count: usize,
    sizes: [usize; MAX_FIELDS],
    aligns: [usize; MAX_FIELDS],
    offsets: [usize; MAX_FIELDS],
    slot_of: [usize; MAX_FIELDS],
    field_of: [usize; MAX_FIELDS],
    row_bytes: usize,
    align: usize,
}

impl Plan {
    /// Plan the layout for fields with the given sizes and alignments,
    /// listed in declaration order.
    ///
    /// # Panics
    ///
    /// Panics (at compile time when used in a constant) if the list is
    /// empty, holds more than [`MAX_FIELDS`] fields, has an alignment that
    /// is not a power of two, or cannot be packed so that every array starts
    /// at a multiple of its field's alignment.
    pub const fn new(sizes: &[usize], aligns: &[usize]) -> Plan {
        let count = sizes.len();
        assert!(count > 0, "a field list needs at least one field");
        assert!(count <= MAX_FIELDS, "a field list holds at most 12 fields");
        assert!(aligns.len() == count, "expected one alignment per field");

        let mut field_of = [0usize; MAX_FIELDS];
        let mut i = 0;
        while i < count {
            field_of[i] = i;
            i += 1;
        }

        // Insertion sort keeps equal sizes in declaration order.
        let mut i = 1;
        while i < count {
            let field = field_of[i];
            let mut j = i;
            while j > 0 && sizes[field_of[j - 1]] < sizes[field] {
                field_of[j] = field_of[j - 1];
                j -= 1;
            }
            field_of[j] = field;
            i += 1;
        }

        let mut plan = Plan {
            count,
            sizes: [0; MAX_FIELDS],
            aligns: [1; MAX_FIELDS],
            offsets: [0; MAX_FIELDS],
            slot_of: [0; MAX_FIELDS],
            field_of,
            row_bytes: 0,
            align: 1,
        };

        let mut running = 0;
        let mut slot = 0;
        while slot < count {
            let field = field_of[slot];
            let size = sizes[field];
            let align = aligns[field];
            assert!(align.is_power_of_two(), "field alignment must be a power of two");
            // Zero-sized arrays occupy no bytes and sit at the aligned block base.
            assert!(
                size == 0 || running % align == 0,
                "field list cannot be packed: a field's array would start misaligned"
            );
            plan.sizes[field] = size;
            plan.aligns[field] = align;
            plan.offsets[field] = if size == 0 { 0 } else { running };
            plan.slot_of[field] = slot;
            if align > plan.align {
                plan.align = align;
            }
            running += size;
            slot += 1;
        }
        plan.row_bytes = running;
        plan
    }

    /// Number of fields.
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Element size of a field.
    pub const fn size(&self, field: usize) -> usize {
        self.sizes[field]
    }

    /// Element alignment of a field.
    pub const fn align_of(&self, field: usize) -> usize {
        self.aligns[field]
    }

    /// Per-row byte offset of a field; multiply by the capacity for the
    /// start of its array.
    pub const fn offset(&self, field: usize) -> usize {
        self.offsets[field]
    }

    /// Physical slot holding a field.
    pub const fn slot_of(&self, field: usize) -> usize {
        self.slot_of[field]
    }

    /// Field stored in a slot.
    pub const fn field_of(&self, slot: usize) -> usize {
        self.field_of[slot]
    }

    /// Element size of the field stored in a slot.
    pub const fn slot_size(&self, slot: usize) -> usize {
        self.sizes[self.field_of[slot]]
    }

    /// Bytes per row, summed over every field.
    pub const fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    /// Alignment of a block: the largest field alignment.
    pub const fn align(&self) -> usize {
        self.align
    }

    /// Byte offset of a field's array within a block of `capacity` rows.
    pub const fn field_start(&self, field: usize, capacity: usize) -> usize {
        self.offsets[field] * capacity
    }

    /// Total bytes of a block of `capacity` rows, or `None` on overflow.
    pub const fn block_bytes(&self, capacity: usize) -> Option<usize> {
        self.row_bytes.checked_mul(capacity)
    }

    /// Whether storage laid out by `self` can be viewed through `other`.
    ///
    /// Requires the same field count, the same element size in every slot,
    /// and an alignment requirement no stricter than this plan's.
    pub const fn can_alias(&self, other: &Plan) -> bool {
        if self.count != other.count || other.align > self.align {
            return false;
        }
        let mut slot = 0;
        while slot < self.count {
            if self.slot_size(slot) != other.slot_size(slot) {
                return false;
            }
            slot += 1;
        }
        true
    }
}

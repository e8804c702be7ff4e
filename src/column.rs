use std::mem;
use std::sync::Arc;

use allocative::{Allocative, Key, Visitor};
use bitvec::prelude::*;

use crate::data_type::DataType;
use crate::error::{Error, Result};
use crate::value::Value;

/// Contiguous values of one column, one vector per physical type.
///
/// A NULL row still occupies a slot here (holding a zero value) so that row
/// `i` is always at index `i`; the owning [Column]'s bitmap says which slots
/// are NULL.
#[derive(Debug, Clone)]
pub enum ColumnData {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<Arc<str>>),
    Bool(BitVec),
}

impl ColumnData {
    fn empty(data_type: DataType) -> Self {
        match data_type {
            DataType::Int => ColumnData::Int(Vec::new()),
            DataType::Float => ColumnData::Float(Vec::new()),
            DataType::Text => ColumnData::Text(Vec::new()),
            DataType::Bool => ColumnData::Bool(BitVec::new()),
        }
    }

    fn push_zero(&mut self) {
        match self {
            ColumnData::Int(v) => v.push(0),
            ColumnData::Float(v) => v.push(0.0),
            ColumnData::Text(v) => v.push(Arc::from("")),
            ColumnData::Bool(v) => v.push(false),
        }
    }

    fn retain(&mut self, keep: &BitSlice) {
        match self {
            ColumnData::Int(v) => retain_flagged(v, keep),
            ColumnData::Float(v) => retain_flagged(v, keep),
            ColumnData::Text(v) => retain_flagged(v, keep),
            ColumnData::Bool(v) => *v = retain_bits(v, keep),
        }
    }
}

/// One column of a table: typed storage plus a NULL bitmap (`true` = NULL).
/// The column's name lives in the owning table's schema.
#[derive(Debug, Clone)]
pub struct Column {
    pub data_type: DataType,
    pub data: ColumnData,
    pub null_bitmap: BitVec,
}

impl Column {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            data: ColumnData::empty(data_type),
            null_bitmap: BitVec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.null_bitmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.null_bitmap.is_empty()
    }

    /// Appends a value. It must already have the column's type or be NULL;
    /// callers coerce first (see [Value::coerce_to]).
    ///
    /// # Example
    /// ```
    /// # use tinysql::column::Column;
    /// # use tinysql::data_type::DataType;
    /// # use tinysql::value::Value;
    /// let mut col = Column::new(DataType::Int);
    /// col.push(Value::Int(30)).unwrap();
    /// col.push(Value::Null).unwrap();
    ///
    /// assert_eq!(col.len(), 2);
    /// assert!(col.get(1).unwrap().is_null());
    /// assert!(col.push(Value::from("thirty")).is_err());
    /// ```
    pub fn push(&mut self, value: Value) -> Result<()> {
        self.check(&value)?;
        self.data.push_zero();
        self.null_bitmap.push(true);
        self.write(self.len() - 1, value);
        Ok(())
    }

    /// `None` past the last row.
    pub fn get(&self, row_idx: usize) -> Option<Value> {
        if *self.null_bitmap.get(row_idx)? {
            return Some(Value::Null);
        }
        Some(match &self.data {
            ColumnData::Int(v) => Value::Int(v[row_idx]),
            ColumnData::Float(v) => Value::Float(v[row_idx]),
            ColumnData::Text(v) => Value::Text(Arc::clone(&v[row_idx])),
            ColumnData::Bool(v) => Value::Bool(v[row_idx]),
        })
    }

    /// Overwrites one row. Setting NULL only flips the bitmap; the stale
    /// value stays in its slot and is never read.
    pub fn set(&mut self, row_idx: usize, value: &Value) -> Result<()> {
        if row_idx >= self.len() {
            return Err(Error::NotFound {
                kind: "row",
                name: row_idx.to_string(),
            });
        }
        self.check(value)?;
        self.write(row_idx, value.clone());
        Ok(())
    }

    /// Keeps the rows whose bit in `keep` is set and drops the rest, in a
    /// single pass. `keep` must have one bit per row.
    pub fn retain(&mut self, keep: &BitSlice) -> Result<()> {
        if keep.len() != self.len() {
            return Err(Error::ArityMismatch {
                expected: self.len(),
                found: keep.len(),
            });
        }
        self.data.retain(keep);
        self.null_bitmap = retain_bits(&self.null_bitmap, keep);
        Ok(())
    }

    fn check(&self, value: &Value) -> Result<()> {
        match value.data_type() {
            None => Ok(()),
            Some(data_type) if data_type == self.data_type => Ok(()),
            Some(_) => Err(Error::type_mismatch(format!(
                "cannot store {} value {value} in a {} column",
                value.type_label(),
                self.data_type
            ))),
        }
    }

    /// Writes a value already accepted by [Column::check] into an existing slot.
    fn write(&mut self, row_idx: usize, value: Value) {
        let stored = match (&mut self.data, value) {
            (_, Value::Null) => false,
            (ColumnData::Int(v), Value::Int(x)) => {
                v[row_idx] = x;
                true
            }
            (ColumnData::Float(v), Value::Float(x)) => {
                v[row_idx] = x;
                true
            }
            (ColumnData::Text(v), Value::Text(x)) => {
                v[row_idx] = x;
                true
            }
            (ColumnData::Bool(v), Value::Bool(x)) => {
                v.set(row_idx, x);
                true
            }
            _ => false,
        };
        self.null_bitmap.set(row_idx, !stored);
    }
}

fn retain_flagged<T>(values: &mut Vec<T>, keep: &BitSlice) {
    let mut flags = keep.iter().by_vals();
    values.retain(|_| flags.next().unwrap_or(false));
}

fn retain_bits(bits: &BitSlice, keep: &BitSlice) -> BitVec {
    bits.iter()
        .by_vals()
        .zip(keep.iter().by_vals())
        .filter_map(|(bit, kept)| kept.then_some(bit))
        .collect()
}

fn bitvec_heap_bytes(bits: &BitVec) -> usize {
    bits.capacity().div_ceil(usize::BITS as usize) * mem::size_of::<usize>()
}

// bitvec has no allocative support, so columns report their heap by hand.
impl Allocative for Column {
    fn visit<'a, 'b: 'a>(&self, visitor: &'a mut Visitor<'b>) {
        let mut visitor = visitor.enter_self_sized::<Self>();
        match &self.data {
            ColumnData::Int(col) => visitor.visit_field(Key::new("int"), col),
            ColumnData::Float(col) => visitor.visit_field(Key::new("float"), col),
            ColumnData::Text(col) => visitor.visit_field(Key::new("text"), col),
            ColumnData::Bool(col) => {
                visitor.visit_simple(Key::new("bool"), bitvec_heap_bytes(col))
            }
        }
        visitor.visit_simple(Key::new("null_bitmap"), bitvec_heap_bytes(&self.null_bitmap));
        visitor.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[Option<i64>]) -> Column {
        let mut col = Column::new(DataType::Int);
        for v in values {
            col.push(v.map_or(Value::Null, Value::Int)).unwrap();
        }
        col
    }

    // ─── Appending ────────────────────────────────────────────────────────

    #[test]
    fn test_new_column_is_empty() {
        let col = Column::new(DataType::Float);

        assert!(col.is_empty());
        assert!(matches!(col.data, ColumnData::Float(ref v) if v.is_empty()));
        assert_eq!(col.get(0), None);
    }

    #[test]
    fn test_push_keeps_slots_aligned() {
        let mut col = Column::new(DataType::Text);
        col.push(Value::from("Alice")).unwrap();
        col.push(Value::Null).unwrap();
        col.push(Value::from("Carol")).unwrap();

        assert_eq!(col.len(), 3);
        assert!(matches!(col.data, ColumnData::Text(ref v) if v.len() == 3));
        assert_eq!(col.null_bitmap, bitvec![0, 1, 0]);
        assert_eq!(col.get(1), Some(Value::Null));
        assert_eq!(col.get(2), Some(Value::from("Carol")));
    }

    #[test]
    fn test_bool_column() {
        let mut col = Column::new(DataType::Bool);
        col.push(Value::Bool(true)).unwrap();
        col.push(Value::Null).unwrap();
        col.push(Value::Bool(false)).unwrap();

        assert_eq!(col.get(0), Some(Value::Bool(true)));
        assert_eq!(col.get(1), Some(Value::Null));
        assert_eq!(col.get(2), Some(Value::Bool(false)));
    }

    #[test]
    fn test_wrong_type_is_rejected_without_a_slot() {
        let mut col = ints(&[Some(1)]);

        assert!(matches!(
            col.push(Value::from("hello")),
            Err(Error::TypeMismatch(_))
        ));
        // no implicit widening at this level
        assert!(col.push(Value::Float(1.0)).is_err());
        assert_eq!(col.len(), 1);
        assert!(matches!(col.data, ColumnData::Int(ref v) if v.len() == 1));
    }

    // ─── Overwriting ──────────────────────────────────────────────────────

    #[test]
    fn test_set() {
        let mut col = ints(&[Some(30), None]);

        col.set(0, &Value::Int(31)).unwrap();
        col.set(1, &Value::Int(25)).unwrap();
        assert_eq!(col.get(0), Some(Value::Int(31)));
        assert_eq!(col.get(1), Some(Value::Int(25)));

        col.set(0, &Value::Null).unwrap();
        assert_eq!(col.get(0), Some(Value::Null));
        col.set(0, &Value::Int(7)).unwrap();
        assert_eq!(col.get(0), Some(Value::Int(7)));

        assert!(matches!(
            col.set(0, &Value::from("x")),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            col.set(10, &Value::Int(42)),
            Err(Error::NotFound { kind: "row", .. })
        ));
        assert_eq!(col.get(0), Some(Value::Int(7)));
    }

    // ─── Bulk removal ─────────────────────────────────────────────────────

    #[test]
    fn test_retain() {
        let mut col = ints(&[Some(1), Some(2), None, Some(4), None]);

        col.retain(bits![1, 0, 1, 1, 0]).unwrap();

        assert_eq!(col.len(), 3);
        assert_eq!(col.get(0), Some(Value::Int(1)));
        assert_eq!(col.get(1), Some(Value::Null));
        assert_eq!(col.get(2), Some(Value::Int(4)));
        assert!(col.retain(bits![1]).is_err());
    }

    #[test]
    fn test_retain_bool_storage() {
        let mut col = Column::new(DataType::Bool);
        for b in [true, false, true, true] {
            col.push(Value::Bool(b)).unwrap();
        }

        col.retain(bits![0, 1, 0, 1]).unwrap();

        assert_eq!(col.get(0), Some(Value::Bool(false)));
        assert_eq!(col.get(1), Some(Value::Bool(true)));
        assert_eq!(col.get(2), None);
    }

    #[test]
    fn test_memory_grows_with_data() {
        let mut col = Column::new(DataType::Int);
        let empty = allocative::size_of_unique_allocated_data(&col);
        for i in 0..1_000 {
            col.push(Value::Int(i)).unwrap();
        }
        assert!(allocative::size_of_unique_allocated_data(&col) >= empty + 8_000);
    }
}

//! Runtime values and the heap
//!
//! Arrays are shared by reference: an array value is just an id into the
//! heap's flat arena, so copying the value copies the id and both copies
//! see the same elements. Cells are the storage slots variables bind to.
//! Nothing is reclaimed during a run; lifetimes end with the scopes that
//! own the bindings, and the data model cannot form cycles.

use crate::ast::decimal_string;
use crate::typeck::Ty;
use num_bigint::BigInt;
use num_rational::BigRational;

/// Opaque id of a storage cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellId(pub(crate) usize);

/// Opaque id of an array record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayId(pub(crate) usize);

/// Opaque id of a function table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunId(pub(crate) usize);

/// A runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    /// Unbounded integer
    Int(BigInt),
    /// Exact rational, kept normalized by `BigRational`
    Float(BigRational),
    /// Shared reference into the heap
    Array(ArrayId),
    /// Internal function address; functions are not first-class values
    Function(FunId),
}

/// The record behind an `ArrayId`
#[derive(Debug, Clone)]
pub struct ArrayRecord {
    pub elem_ty: Ty,
    pub elems: Vec<Value>,
}

/// Flat arena of cells and array records, indexed by small integers
#[derive(Debug, Default)]
pub struct Heap {
    cells: Vec<Value>,
    arrays: Vec<ArrayRecord>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_cell(&mut self, value: Value) -> CellId {
        let id = CellId(self.cells.len());
        self.cells.push(value);
        id
    }

    pub fn cell(&self, id: CellId) -> &Value {
        &self.cells[id.0]
    }

    pub fn cell_mut(&mut self, id: CellId) -> &mut Value {
        &mut self.cells[id.0]
    }

    pub fn alloc_array(&mut self, elem_ty: Ty, elems: Vec<Value>) -> ArrayId {
        let id = ArrayId(self.arrays.len());
        self.arrays.push(ArrayRecord { elem_ty, elems });
        id
    }

    pub fn array(&self, id: ArrayId) -> &ArrayRecord {
        &self.arrays[id.0]
    }

    pub fn array_mut(&mut self, id: ArrayId) -> &mut ArrayRecord {
        &mut self.arrays[id.0]
    }

    /// Element-wise deep equality. Arrays with the same id are trivially
    /// equal; arrays with equal content but distinct ids are equal too.
    pub fn deep_eq(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Array(x), Value::Array(y)) => {
                if x == y {
                    return true;
                }
                let (ra, rb) = (self.array(*x), self.array(*y));
                ra.elems.len() == rb.elems.len()
                    && ra.elems.iter().zip(&rb.elems).all(|(u, v)| self.deep_eq(u, v))
            }
            _ => a == b,
        }
    }

    /// Clone a value, duplicating the whole array structure behind it.
    /// Scalars are plain copies.
    pub fn deep_copy(&mut self, value: &Value) -> Value {
        match value {
            Value::Array(aid) => {
                let record = self.array(*aid);
                let (elem_ty, elems) = (record.elem_ty.clone(), record.elems.clone());
                let copied = elems.iter().map(|v| self.deep_copy(v)).collect();
                Value::Array(self.alloc_array(elem_ty, copied))
            }
            other => other.clone(),
        }
    }

    /// Render a value as Devin source text
    pub fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Unit => "unit".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(r) => decimal_string(r),
            Value::Array(aid) => {
                let parts: Vec<String> = self
                    .array(*aid)
                    .elems
                    .iter()
                    .map(|v| self.format_value(v))
                    .collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Function(_) => "<function>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(BigInt::from(i))
    }

    #[test]
    fn test_cells() {
        let mut heap = Heap::new();
        let cell = heap.alloc_cell(int(1));
        assert_eq!(*heap.cell(cell), int(1));
        *heap.cell_mut(cell) = int(2);
        assert_eq!(*heap.cell(cell), int(2));
    }

    #[test]
    fn test_array_values_share_by_id() {
        let mut heap = Heap::new();
        let aid = heap.alloc_array(Ty::Int, vec![int(1), int(2)]);
        let a = Value::Array(aid);
        let b = a.clone();
        heap.array_mut(aid).elems[0] = int(9);
        // Both values see the mutation; they are the same array.
        assert!(heap.deep_eq(&a, &b));
        assert_eq!(heap.array(aid).elems[0], int(9));
    }

    #[test]
    fn test_deep_eq_across_allocations() {
        let mut heap = Heap::new();
        let a = Value::Array(heap.alloc_array(Ty::Int, vec![int(1), int(2)]));
        let b = Value::Array(heap.alloc_array(Ty::Int, vec![int(1), int(2)]));
        assert!(heap.deep_eq(&a, &b));

        if let Value::Array(aid) = a {
            heap.array_mut(aid).elems[0] = int(0);
        }
        assert!(!heap.deep_eq(&a, &b));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let mut heap = Heap::new();
        let inner = heap.alloc_array(Ty::Int, vec![int(1)]);
        let outer = heap.alloc_array(Ty::array(Ty::Int), vec![Value::Array(inner)]);
        let original = Value::Array(outer);

        let copy = heap.deep_copy(&original);
        heap.array_mut(inner).elems[0] = int(9);

        // The copy duplicated the nested structure too.
        assert!(!heap.deep_eq(&original, &copy));
    }

    #[test]
    fn test_format_value() {
        let mut heap = Heap::new();
        let aid = heap.alloc_array(
            Ty::Float,
            vec![
                Value::Float(BigRational::new(BigInt::from(1), BigInt::from(2))),
                Value::Float(BigRational::new(BigInt::from(1), BigInt::from(3))),
            ],
        );
        assert_eq!(heap.format_value(&Value::Array(aid)), "[0.5, 0.(3)]");
        assert_eq!(heap.format_value(&Value::Unit), "unit");
    }
}

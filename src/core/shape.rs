// This module defines tensor shapes and the shape-to-bytes codec seam. A TensorShape is an
// element data type plus an ordered list of dimensions, each with a size and a stride. The
// ShapeCodec trait resolves a shape into a byte footprint; the tiling search sums these
// footprints over every refinement of a candidate tile and compares the total against the
// scratch-memory budget. DenseCodec, the default, charges the element count times the
// element width. Any closure taking a shape and returning a byte count is also a codec,
// which lets callers plug in target-specific layouts. make_odd_tile pads every even
// dimension size by one for the odd-size footprint estimate.

//! Tensor shapes and byte-size resolution.

use std::fmt;

/// Element data type of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F16,
    F32,
    F64,
}

impl DataType {
    /// Width of one element in bytes.
    pub const fn byte_width(self) -> u64 {
        use DataType::*;
        match self {
            Bool | I8 | U8 => 1,
            I16 | U16 | F16 => 2,
            I32 | U32 | F32 => 4,
            I64 | U64 | F64 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        use DataType::*;
        match self {
            Bool => "bool",
            I8 => "i8",
            I16 => "i16",
            I32 => "i32",
            I64 => "i64",
            U8 => "u8",
            U16 => "u16",
            U32 => "u32",
            U64 => "u64",
            F16 => "f16",
            F32 => "f32",
            F64 => "f64",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        use DataType::*;
        match s {
            "bool" => Some(Bool),
            "i8" => Some(I8),
            "i16" => Some(I16),
            "i32" => Some(I32),
            "i64" => Some(I64),
            "u8" => Some(U8),
            "u16" => Some(U16),
            "u32" => Some(U32),
            "u64" => Some(U64),
            "f16" => Some(F16),
            "f32" => Some(F32),
            "f64" => Some(F64),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One dimension of a tensor shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dim {
    pub size: u64,
    pub stride: i64,
}

impl Dim {
    pub fn new(size: u64, stride: i64) -> Self {
        Self { size, stride }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorShape {
    pub dtype: DataType,
    pub dims: Vec<Dim>,
}

impl TensorShape {
    pub fn new(dtype: DataType, dims: Vec<Dim>) -> Self {
        Self { dtype, dims }
    }

    /// Row-major packed shape for the given sizes.
    pub fn packed(dtype: DataType, sizes: &[u64]) -> Self {
        let mut dims = Vec::with_capacity(sizes.len());
        let mut stride: i64 = 1;
        for &size in sizes.iter().rev() {
            dims.push(Dim::new(size, stride));
            stride = stride.saturating_mul(i64::try_from(size).unwrap_or(i64::MAX));
        }
        dims.reverse();
        Self { dtype, dims }
    }

    /// Product of all dimension sizes (element count of a dense view).
    ///
    /// Saturates at `u64::MAX`, so an oversized shape never fits a budget.
    pub fn sizes_product(&self) -> u64 {
        self.dims.iter().fold(1u64, |acc, d| acc.saturating_mul(d.size))
    }

    pub fn sizes(&self) -> Vec<u64> {
        self.dims.iter().map(|d| d.size).collect()
    }
}

/// Widen every even dimension size by one.
pub fn make_odd_tile(tile: &TensorShape) -> TensorShape {
    let mut odd = tile.clone();
    for dim in &mut odd.dims {
        if dim.size & 1 == 0 {
            dim.size = dim.size.saturating_add(1);
        }
    }
    odd
}

/// Resolves a shape into the number of bytes it occupies.
///
/// Implementations used with the pruned tiling search must be monotone:
/// growing any dimension size never shrinks the result.
pub trait ShapeCodec {
    fn byte_size(&self, shape: &TensorShape) -> u64;
}

/// Dense layout: element count times element width.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseCodec;

impl ShapeCodec for DenseCodec {
    fn byte_size(&self, shape: &TensorShape) -> u64 {
        shape.sizes_product().saturating_mul(shape.dtype.byte_width())
    }
}

impl<F> ShapeCodec for F
where
    F: Fn(&TensorShape) -> u64,
{
    fn byte_size(&self, shape: &TensorShape) -> u64 {
        self(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_strides_are_row_major() {
        let shape = TensorShape::packed(DataType::F32, &[4, 3, 2]);
        let strides: Vec<i64> = shape.dims.iter().map(|d| d.stride).collect();
        assert_eq!(strides, vec![6, 2, 1]);
        assert_eq!(shape.sizes_product(), 24);

        let huge = TensorShape::packed(DataType::F64, &[1 << 32, 1 << 32, 2]);
        assert_eq!(huge.dims[0].stride, i64::MAX);
        assert_eq!(huge.sizes_product(), u64::MAX);
        assert_eq!(DenseCodec.byte_size(&huge), u64::MAX);
    }

    #[test]
    fn dense_codec_counts_bytes() {
        let shape = TensorShape::packed(DataType::F16, &[3, 5]);
        assert_eq!(DenseCodec.byte_size(&shape), 30);
    }

    #[test]
    fn odd_tile_pads_only_even_sizes() {
        let shape = TensorShape::packed(DataType::I8, &[2, 3, 4, 1]);
        assert_eq!(make_odd_tile(&shape).sizes(), vec![3, 3, 5, 1]);
        // strides are left alone
        assert_eq!(make_odd_tile(&shape).dims[0].stride, shape.dims[0].stride);
    }

    #[test]
    fn closures_are_codecs() {
        let codec = |shape: &TensorShape| shape.dims.len() as u64;
        let shape = TensorShape::packed(DataType::F64, &[7, 7]);
        assert_eq!(codec.byte_size(&shape), 2);
    }
}

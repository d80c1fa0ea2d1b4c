//! Shape enums and index arithmetic for dense, packed, and banded storage.
//! Everything is column-major.

use crate::error::BlasError;

/// Which triangle of a matrix is referenced.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Fill {
    Upper = 121,
    Lower = 122,
    Full = 123,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    None = 111,
    Transpose = 112,
    ConjugateTranspose = 113,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Diagonal {
    NonUnit = 131,
    Unit = 132,
}

impl Fill {
    pub const fn letter(self) -> char {
        match self {
            Fill::Upper => 'U',
            Fill::Lower => 'L',
            Fill::Full => 'F',
        }
    }

    /// Triangular routines accept only `Upper` and `Lower`.
    pub(crate) fn require_triangle(self) -> Result<Triangle, BlasError> {
        match self {
            Fill::Upper => Ok(Triangle::Upper),
            Fill::Lower => Ok(Triangle::Lower),
            Fill::Full => Err(BlasError::invalid_value("fill mode must be upper or lower")),
        }
    }
}

impl Operation {
    pub const fn letter(self) -> char {
        match self {
            Operation::None => 'N',
            Operation::Transpose => 'T',
            Operation::ConjugateTranspose => 'C',
        }
    }
}

impl Diagonal {
    pub const fn letter(self) -> char {
        match self {
            Diagonal::NonUnit => 'N',
            Diagonal::Unit => 'U',
        }
    }

    pub const fn is_unit(self) -> bool {
        matches!(self, Diagonal::Unit)
    }
}

macro_rules! impl_raw_enum {
    ($name:ident { $($variant:ident = $raw:literal => $ch:literal),+ $(,)? }) => {
        impl TryFrom<u32> for $name {
            type Error = BlasError;

            fn try_from(raw: u32) -> Result<Self, Self::Error> {
                match raw {
                    $($raw => Ok($name::$variant),)+
                    other => Err(BlasError::invalid_value(format!(
                        "{} value {other} is not recognised",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl TryFrom<char> for $name {
            type Error = BlasError;

            fn try_from(letter: char) -> Result<Self, Self::Error> {
                match letter.to_ascii_uppercase() {
                    $($ch => Ok($name::$variant),)+
                    other => Err(BlasError::invalid_value(format!(
                        "{} letter '{other}' is not recognised",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

impl_raw_enum!(Fill { Upper = 121 => 'U', Lower = 122 => 'L', Full = 123 => 'F' });
impl_raw_enum!(Operation { None = 111 => 'N', Transpose = 112 => 'T', ConjugateTranspose = 113 => 'C' });
impl_raw_enum!(Diagonal { NonUnit = 131 => 'N', Unit = 132 => 'U' });

/// A validated triangle, as used by packed and triangular kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Triangle {
    Upper,
    Lower,
}

impl Triangle {
    pub(crate) fn contains(self, row: usize, col: usize) -> bool {
        match self {
            Triangle::Upper => row <= col,
            Triangle::Lower => row >= col,
        }
    }
}

/// Number of elements in packed storage for an `n x n` triangle.
pub const fn packed_len(n: usize) -> usize {
    n * (n + 1) / 2
}

/// Offset of `(row, col)` inside packed storage. The pair must lie in `triangle`.
pub(crate) fn packed_index(triangle: Triangle, n: usize, row: usize, col: usize) -> usize {
    match triangle {
        Triangle::Upper => row + col * (col + 1) / 2,
        Triangle::Lower => row + col * (2 * n - col - 1) / 2,
    }
}

/// Offset of logical element `i` of an `n`-vector with increment `inc`.
/// Negative increments walk the storage backwards from the far end.
pub fn vector_index(i: usize, n: usize, inc: i64) -> usize {
    if inc >= 0 {
        i * inc as usize
    } else {
        (n - 1 - i) * inc.unsigned_abs() as usize
    }
}

/// Element offset of logical element 0 relative to the base pointer.
pub(crate) fn negative_inc_shift(n: i64, inc: i64) -> i64 {
    if inc < 0 && n > 0 {
        -inc * (n - 1)
    } else {
        0
    }
}

/// Elements spanned by an `n`-vector with increment `inc`.
pub fn vector_span(n: usize, inc: i64) -> usize {
    if n == 0 {
        0
    } else {
        1 + (n - 1) * inc.unsigned_abs() as usize
    }
}

/// Elements spanned by a column-major `rows x cols` matrix with leading dimension `ld`.
pub fn matrix_span(rows: usize, cols: usize, ld: usize) -> usize {
    if rows == 0 || cols == 0 {
        0
    } else {
        (cols - 1) * ld + rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_upper_walks_columns() {
        let n = 3;
        let order: Vec<usize> = (0..n)
            .flat_map(|col| (0..=col).map(move |row| (row, col)))
            .map(|(row, col)| packed_index(Triangle::Upper, n, row, col))
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn packed_lower_walks_columns() {
        let n = 3;
        let order: Vec<usize> = (0..n)
            .flat_map(|col| (col..n).map(move |row| (row, col)))
            .map(|(row, col)| packed_index(Triangle::Lower, n, row, col))
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn negative_increment_reverses() {
        assert_eq!(vector_index(0, 4, -2), 6);
        assert_eq!(vector_index(3, 4, -2), 0);
        assert_eq!(negative_inc_shift(4, -2), 6);
        assert_eq!(vector_span(4, -2), 7);
    }

    #[test]
    fn raw_enums_round_trip() {
        assert_eq!(Fill::try_from(122u32).unwrap(), Fill::Lower);
        assert_eq!(Operation::try_from('c').unwrap(), Operation::ConjugateTranspose);
        assert!(Diagonal::try_from(7u32).is_err());
        assert!(Fill::Full.require_triangle().is_err());
    }
}

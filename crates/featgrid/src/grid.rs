use crate::FeatureValues;
use core::ops::Index;

/// Dense `ids × windows` grid of feature values.
///
/// `grid[(i, j)]` holds the values of `ids[i]` under `windows[j]`, both in
/// request order. Cells are stored row-major. A grid only ever leaves the
/// reassembler fully populated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TensorGrid {
    rows: usize,
    cols: usize,
    cells: Vec<FeatureValues>,
}

impl TensorGrid {
    pub(crate) fn with_shape(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: Vec::with_capacity(rows.saturating_mul(cols)),
        }
    }

    /// Cells filled so far, in row-major order.
    pub(crate) fn filled(&self) -> usize {
        self.cells.len()
    }

    pub(crate) fn push(&mut self, cell: FeatureValues) {
        debug_assert!(self.cells.len() < self.rows * self.cols);
        self.cells.push(cell);
    }

    /// `(ids, windows)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of requested ids.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of requested windows.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The cell for `ids[row]` under `windows[col]`, or `None` if out of
    /// bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<&FeatureValues> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get(row * self.cols + col)
    }

    /// All windows of one id, in request order.
    pub fn row(&self, row: usize) -> Option<&[FeatureValues]> {
        if row >= self.rows {
            return None;
        }
        let start = row * self.cols;
        self.cells.get(start..start + self.cols)
    }

    /// Every row in request order; see [`TensorGrid::row`].
    pub fn iter_rows(&self) -> impl ExactSizeIterator<Item = &[FeatureValues]> + '_ {
        (0..self.rows).map(move |row| {
            let start = row * self.cols;
            &self.cells[start..start + self.cols]
        })
    }

    /// One window across all ids, in request order.
    pub fn column(&self, col: usize) -> Option<impl ExactSizeIterator<Item = &FeatureValues> + '_> {
        if col >= self.cols {
            return None;
        }
        Some((0..self.rows).map(move |row| &self.cells[row * self.cols + col]))
    }

    /// Flattened view for single-window requests: one entry per id.
    ///
    /// Returns `None` unless the grid has exactly one window.
    pub fn single_window(&self) -> Option<&[FeatureValues]> {
        (self.cols == 1).then_some(self.cells.as_slice())
    }

    /// Owning variant of [`TensorGrid::single_window`]; hands the grid back
    /// unchanged if it does not have exactly one window.
    pub fn into_single_window(self) -> Result<Vec<FeatureValues>, Self> {
        if self.cols == 1 {
            Ok(self.cells)
        } else {
            Err(self)
        }
    }

    /// Row-major cells.
    pub fn into_cells(self) -> Vec<FeatureValues> {
        self.cells
    }

    /// Copies every cell out of the batch buffers it may still be viewing.
    #[must_use]
    pub fn detach(&self) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            cells: self.cells.iter().map(FeatureValues::detach).collect(),
        }
    }
}

impl Index<(usize, usize)> for TensorGrid {
    type Output = FeatureValues;

    fn index(&self, (row, col): (usize, usize)) -> &Self::Output {
        assert!(
            row < self.rows && col < self.cols,
            "grid index ({row}, {col}) out of bounds for shape ({}, {})",
            self.rows,
            self.cols
        );
        &self.cells[row * self.cols + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: usize, cols: usize) -> TensorGrid {
        let mut grid = TensorGrid::with_shape(rows, cols);
        for i in 0..rows * cols {
            grid.push(FeatureValues::from_slice(&[i as f32]));
        }
        grid
    }

    #[test]
    fn row_major_access() {
        let g = grid(2, 3);
        assert_eq!(g.shape(), (2, 3));
        assert_eq!(g[(1, 2)].to_vec(), vec![5.0]);
        assert_eq!(g.get(0, 1).unwrap().to_vec(), vec![1.0]);
        assert!(g.get(2, 0).is_none());
        assert!(g.get(0, 3).is_none());
        assert_eq!(g.row(1).unwrap().len(), 3);
        assert_eq!(g.iter_rows().count(), 2);

        let col: Vec<Vec<f32>> = g.column(1).unwrap().map(FeatureValues::to_vec).collect();
        assert_eq!(col, vec![vec![1.0], vec![4.0]]);
        assert!(g.single_window().is_none());
        assert!(g.into_single_window().is_err());
    }

    #[test]
    fn single_window_flattens_to_one_entry_per_id() {
        let g = grid(3, 1);
        let flat = g.single_window().unwrap();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[2].to_vec(), vec![2.0]);
        assert_eq!(g.into_single_window().unwrap().len(), 3);
    }

    #[test]
    fn zero_windows_still_has_rows() {
        let g = TensorGrid::with_shape(2, 0);
        assert_eq!(g.row(1), Some(&[][..]));
        assert_eq!(g.iter_rows().map(<[_]>::len).sum::<usize>(), 0);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn index_out_of_bounds_panics() {
        let g = grid(1, 1);
        let _ = &g[(0, 1)];
    }
}

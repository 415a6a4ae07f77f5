/// Sequence × condition expression profiles
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixProfile {
    pub name: String,
    rows: Vec<String>,
    columns: Vec<String>,
    cells: Vec<Option<f64>>,
}

impl MatrixProfile {
    /// Empty profile: no cell has a recorded value
    pub fn new(name: impl Into<String>, rows: Vec<String>, columns: Vec<String>) -> Self {
        let cells = vec![None; rows.len() * columns.len()];
        MatrixProfile {
            name: name.into(),
            rows,
            columns,
            cells,
        }
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn index(&self, row: &str, column: &str) -> Option<usize> {
        let r = self.rows.iter().position(|x| x == row)?;
        let c = self.columns.iter().position(|x| x == column)?;
        Some(r * self.columns.len() + c)
    }

    pub fn get(&self, row: &str, column: &str) -> Option<f64> {
        self.index(row, column).and_then(|i| self.cells[i])
    }

    /// Record a value; returns false when the row or column is unknown
    pub fn set(&mut self, row: &str, column: &str, value: f64) -> bool {
        match self.index(row, column) {
            Some(i) => {
                self.cells[i] = Some(value);
                true
            }
            None => false,
        }
    }

    /// Every cell as (row, column, value) in row-major order
    pub fn cells_mut(&mut self) -> impl Iterator<Item = (&str, &str, &mut Option<f64>)> {
        let width = self.columns.len();
        let rows = &self.rows;
        let columns = &self.columns;
        self.cells.iter_mut().enumerate().map(move |(i, cell)| {
            (
                rows[i / width].as_str(),
                columns[i % width].as_str(),
                cell,
            )
        })
    }

    pub fn recorded(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}

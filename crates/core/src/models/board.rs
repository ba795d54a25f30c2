//! Board model and fleet validation
//!
//! A board is a 10x10 grid of fields. Cells travel on the wire as two
//! decimal digits, row first: `"34"` is row 3, column 4.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Board edge length
pub const BOARD_SIZE: usize = 10;

/// Total number of fields on a board
pub const BOARD_FIELDS: usize = BOARD_SIZE * BOARD_SIZE;

/// Ship lengths and how many ships of each length a fleet carries
pub const FLEET: [(usize, usize); 4] = [(4, 1), (3, 2), (2, 3), (1, 4)];

/// Number of ship segments in a complete fleet
pub const FLEET_CELLS: usize = 20;

/// Longest ship in the fleet
const MAX_SHIP_LEN: usize = 4;

/// State of a single board field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Field {
    #[default]
    None,
    Ship,
    Hit,
    Miss,
    /// Ruled out by the server (e.g. next to a sunk ship)
    Invalidated,
}

impl Field {
    /// Wire name of the field
    pub fn as_str(self) -> &'static str {
        match self {
            Field::None => "NONE",
            Field::Ship => "SHIP",
            Field::Hit => "HIT",
            Field::Miss => "MISS",
            Field::Invalidated => "INVALIDATED",
        }
    }

    /// Whether a shot at this field would be a repeat
    pub fn is_resolved(self) -> bool {
        matches!(self, Field::Hit | Field::Miss | Field::Invalidated)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NONE" => Ok(Field::None),
            "SHIP" => Ok(Field::Ship),
            "HIT" => Ok(Field::Hit),
            "MISS" => Ok(Field::Miss),
            "INVALIDATED" => Ok(Field::Invalidated),
            other => Err(Error::InvalidField(other.to_string())),
        }
    }
}

/// A position on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    row: u8,
    col: u8,
}

impl Cell {
    pub fn new(row: usize, col: usize) -> Result<Self> {
        if row >= BOARD_SIZE || col >= BOARD_SIZE {
            return Err(Error::InvalidCell(format!(
                "({}, {}) is outside the {}x{} board",
                row, col, BOARD_SIZE, BOARD_SIZE
            )));
        }
        Ok(Self {
            row: row as u8,
            col: col as u8,
        })
    }

    pub fn row(self) -> usize {
        self.row as usize
    }

    pub fn col(self) -> usize {
        self.col as usize
    }

    fn index(self) -> usize {
        self.row() * BOARD_SIZE + self.col()
    }

    fn from_index(index: usize) -> Self {
        Self {
            row: (index / BOARD_SIZE) as u8,
            col: (index % BOARD_SIZE) as u8,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.col)
    }
}

impl FromStr for Cell {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.as_bytes() {
            [r, c] if r.is_ascii_digit() && c.is_ascii_digit() => {
                Cell::new((r - b'0') as usize, (c - b'0') as usize)
            }
            _ => Err(Error::InvalidCell(format!("'{}' is not a two-digit cell", s))),
        }
    }
}

/// A 10x10 board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    fields: [Field; BOARD_FIELDS],
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// Create an empty board
    pub fn new() -> Self {
        Self {
            fields: [Field::None; BOARD_FIELDS],
        }
    }

    /// Create a board with ships on the given cells
    pub fn with_ships<I: IntoIterator<Item = Cell>>(cells: I) -> Self {
        let mut board = Self::new();
        for cell in cells {
            board.set(cell, Field::Ship);
        }
        board
    }

    /// Build a board from row-major fields (must be exactly 100)
    pub fn from_fields(fields: &[Field]) -> Result<Self> {
        let fields: [Field; BOARD_FIELDS] = fields.try_into().map_err(|_| {
            Error::InvalidBoard(format!(
                "expected {} fields, got {}",
                BOARD_FIELDS,
                fields.len()
            ))
        })?;
        Ok(Self { fields })
    }

    pub fn get(&self, cell: Cell) -> Field {
        self.fields[cell.index()]
    }

    pub fn set(&mut self, cell: Cell, field: Field) {
        self.fields[cell.index()] = field;
    }

    /// Row-major view of all fields
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Cells holding a ship, in row-major order
    pub fn ship_cells(&self) -> Vec<Cell> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| **f == Field::Ship)
            .map(|(i, _)| Cell::from_index(i))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|f| *f == Field::None)
    }

    pub fn reset(&mut self) {
        self.fields = [Field::None; BOARD_FIELDS];
    }

    fn is_ship(&self, row: isize, col: isize) -> bool {
        let size = BOARD_SIZE as isize;
        row >= 0
            && col >= 0
            && row < size
            && col < size
            && self.fields[row as usize * BOARD_SIZE + col as usize] == Field::Ship
    }

    /// Check that the ships on this board form exactly one legal fleet
    ///
    /// Ships must be straight, must not touch each other by side or corner,
    /// and their lengths must match [`FLEET`].
    pub fn validate_fleet(&self) -> Result<()> {
        // Touching by corner also rules out bent ships
        for cell in self.ship_cells() {
            let (r, c) = (cell.row() as isize, cell.col() as isize);
            for (dr, dc) in [(-1, -1), (-1, 1), (1, -1), (1, 1)] {
                if self.is_ship(r + dr, c + dc) {
                    return Err(Error::InvalidBoard(format!(
                        "ships touch diagonally at {}",
                        cell
                    )));
                }
            }
        }

        let mut remaining = [0usize; MAX_SHIP_LEN + 1];
        for (len, count) in FLEET {
            remaining[len] = count;
        }

        let mut visited = [false; BOARD_FIELDS];
        for cell in self.ship_cells() {
            if visited[cell.index()] {
                continue;
            }

            // Row-major scan always lands on the top-left end of a ship
            let (r, c) = (cell.row() as isize, cell.col() as isize);
            let mut across = 1;
            while self.is_ship(r, c + across) {
                across += 1;
            }
            let mut down = 1;
            while self.is_ship(r + down, c) {
                down += 1;
            }
            if across > 1 && down > 1 {
                return Err(Error::InvalidBoard(format!(
                    "ship at {} is not straight",
                    cell
                )));
            }

            let len = across.max(down) as usize;
            for i in 0..len {
                let index = if across > 1 {
                    cell.index() + i
                } else {
                    cell.index() + i * BOARD_SIZE
                };
                visited[index] = true;
            }

            if len > MAX_SHIP_LEN {
                return Err(Error::InvalidBoard(format!(
                    "ship at {} is {} fields long (max {})",
                    cell, len, MAX_SHIP_LEN
                )));
            }
            if remaining[len] == 0 {
                return Err(Error::InvalidBoard(format!(
                    "too many ships of length {}",
                    len
                )));
            }
            remaining[len] -= 1;
        }

        if let Some(len) = (1..=MAX_SHIP_LEN).find(|len| remaining[*len] > 0) {
            return Err(Error::InvalidBoard(format!(
                "missing {} ship(s) of length {}",
                remaining[len], len
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> Cell {
        s.parse().unwrap()
    }

    /// A legal fleet
    fn standard_fleet() -> Board {
        let cells = [
            // length 4
            "00", "01", "02", "03",
            // length 3
            "20", "21", "22",
            "05", "15", "25",
            // length 2
            "40", "41",
            "44", "54",
            "08", "09",
            // length 1
            "60", "66", "88", "93",
        ];
        Board::with_ships(cells.iter().map(|s| cell(s)))
    }

    #[test]
    fn test_cell_wire_format() {
        let c = Cell::new(3, 4).unwrap();
        assert_eq!(c.to_string(), "34");
        assert_eq!(cell("34"), c);
        assert_eq!(cell("09").col(), 9);
    }

    #[test]
    fn test_cell_rejects_bad_input() {
        assert!("3".parse::<Cell>().is_err());
        assert!("345".parse::<Cell>().is_err());
        assert!("a4".parse::<Cell>().is_err());
        assert!(Cell::new(10, 0).is_err());
    }

    #[test]
    fn test_field_names() {
        for field in [
            Field::None,
            Field::Ship,
            Field::Hit,
            Field::Miss,
            Field::Invalidated,
        ] {
            assert_eq!(field.as_str().parse::<Field>().unwrap(), field);
        }
        assert!("SUNK".parse::<Field>().is_err());
    }

    #[test]
    fn test_standard_fleet_is_valid() {
        let board = standard_fleet();
        assert_eq!(board.ship_cells().len(), FLEET_CELLS);
        board.validate_fleet().unwrap();
    }

    #[test]
    fn test_empty_board_is_incomplete() {
        assert!(Board::new().validate_fleet().is_err());
    }

    #[test]
    fn test_diagonal_touch_rejected() {
        let mut board = standard_fleet();
        // Move the single at 66 next to the corner of 54
        board.set(cell("66"), Field::None);
        board.set(cell("65"), Field::Ship);
        assert!(board.validate_fleet().is_err());
    }

    #[test]
    fn test_side_touch_rejected() {
        let mut board = standard_fleet();
        // Extends the length-2 ship at 40-41 into a length-3
        board.set(cell("60"), Field::None);
        board.set(cell("42"), Field::Ship);
        assert!(board.validate_fleet().is_err());
    }

    #[test]
    fn test_bent_ship_rejected() {
        let board = Board::with_ships([cell("00"), cell("01"), cell("11")]);
        let err = board.validate_fleet().unwrap_err();
        assert!(err.to_string().contains("diagonally"));
    }

    #[test]
    fn test_too_long_ship_rejected() {
        let board = Board::with_ships((0..5).map(|c| Cell::new(0, c).unwrap()));
        let err = board.validate_fleet().unwrap_err();
        assert!(err.to_string().contains("max 4"));
    }

    #[test]
    fn test_ship_cells_are_row_major() {
        let board = Board::with_ships([cell("55"), cell("12"), cell("10")]);
        let cells: Vec<String> = board.ship_cells().iter().map(|c| c.to_string()).collect();
        assert_eq!(cells, vec!["10", "12", "55"]);
    }

    #[test]
    fn test_from_fields_length() {
        assert!(Board::from_fields(&[Field::None; 99]).is_err());
        let board = Board::from_fields(&[Field::Miss; BOARD_FIELDS]).unwrap();
        assert_eq!(board.get(cell("77")), Field::Miss);
    }
}

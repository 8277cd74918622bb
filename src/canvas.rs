use std::collections::BTreeMap;
use std::fmt::{Display, Error, Formatter};

/// Cells per canvas row
pub const ROW_STRIDE: u16 = 0x20;

/// Canvas is the sparse tile map a background program paints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Canvas {
    cells: BTreeMap<u16, u8>,
}

impl Canvas {
    pub fn new() -> Canvas {
        Canvas::default()
    }

    /// paint sets one cell, later paints win
    pub fn paint(&mut self, addr: u16, value: u8) {
        self.cells.insert(addr, value);
    }

    pub fn get(&self, addr: u16) -> Option<u8> {
        self.cells.get(&addr).copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, u8)> + '_ {
        self.cells.iter().map(|(a, v)| (*a, *v))
    }

    /// rows returns the row aligned `[low, high)` address range covering every painted cell
    pub fn rows(&self) -> Option<(u32, u32)> {
        let low = *self.cells.keys().next()? as u32 & 0xFFE0;
        let high = (*self.cells.keys().next_back()? as u32 | 0x001F) + 1;
        Some((low, high))
    }

    /// render draws every row as hex cells, unpainted cells are blank
    pub fn render(&self) -> Vec<String> {
        let Some((low, high)) = self.rows() else {
            return Vec::new();
        };
        (low..high)
            .step_by(ROW_STRIDE as usize)
            .map(|row| {
                (0..ROW_STRIDE as u32)
                    .map(|n| match self.get((row + n) as u16) {
                        Some(v) => format!("{:02X}", v),
                        None => "  ".to_string(),
                    })
                    .collect()
            })
            .collect()
    }
}

impl Display for Canvas {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        for line in self.render() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

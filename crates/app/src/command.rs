//! Commands typed at the prompt

use std::str::FromStr;

use bship_core::{Board, Cell};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create,
    Join(String),
    Leave,
    /// Ship cells as two-digit `rc` positions
    Board(Board),
    Turn { row: usize, col: usize },
    State,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  create                 open a new room
  join <code>            join a room by its 4-digit code
  leave                  leave the current room
  board <rc> <rc> ...    place the fleet (20 cells, e.g. 00 01 02 03 ...)
  turn <row> <col>       fire at the opponent
  state                  print the session state
  quit                   disconnect and exit";

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err("empty command".to_string());
        };
        let args: Vec<&str> = words.collect();

        let command = match (verb, args.as_slice()) {
            ("create", []) => Command::Create,
            ("join", [code]) => Command::Join(code.to_string()),
            ("leave", []) => Command::Leave,
            ("board", cells) if !cells.is_empty() => {
                let cells = cells
                    .iter()
                    .map(|c| c.parse::<Cell>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| e.to_string())?;
                Command::Board(Board::with_ships(cells))
            }
            ("turn", [row, col]) => Command::Turn {
                row: row.parse().map_err(|_| format!("bad row '{}'", row))?,
                col: col.parse().map_err(|_| format!("bad column '{}'", col))?,
            },
            ("state", []) => Command::State,
            ("help", []) => Command::Help,
            ("quit" | "exit", []) => Command::Quit,
            _ => return Err(format!("unknown command '{}', try 'help'", line.trim())),
        };
        Ok(command)
    }
}

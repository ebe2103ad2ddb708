//! Console commands.
//!
//! One line per command, whitespace separated:
//!   status               - role, tick, players
//!   save <path>          - write a snapshot of the loaded world
//!   mine <x> <y>         - start mining a cell
//!   place <x> <y> <slot> - place the block item in a slot
//!   select <n>           - change the held slot
//!   craft                - collect the crafting grid's result
//!   craftset <cell> <slot> - swap a slot into the crafting grid
//!   attack               - hit the nearest entity in reach
//!   discard <slot>       - throw a slot's stack
//!   eat <slot>           - eat one unit of food
//!   keys [left] [right] [jump] - set held movement keys
//!   quit                 - exit

use std::str::FromStr;

use voxel_shared::entity::KeyState;

use crate::input::parse_keys;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Status,
    Save(String),
    Mine { x: i32, y: i32 },
    Place { x: i32, y: i32, slot: usize },
    Select(usize),
    Craft,
    CraftSet { cell: usize, slot: usize },
    Attack,
    Discard(usize),
    Eat(usize),
    Keys(KeyState),
    Quit,
}

fn arg<T: FromStr>(tokens: &[&str], i: usize, usage: &str) -> Result<T, String> {
    tokens
        .get(i)
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| format!("Usage: {usage}"))
}

impl ConsoleCommand {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&head) = tokens.first() else {
            return Ok(None);
        };

        let cmd = match head {
            "status" => ConsoleCommand::Status,
            "save" => ConsoleCommand::Save(arg(&tokens, 1, "save <path>")?),
            "mine" => {
                let usage = "mine <x> <y>";
                ConsoleCommand::Mine {
                    x: arg(&tokens, 1, usage)?,
                    y: arg(&tokens, 2, usage)?,
                }
            }
            "place" => {
                let usage = "place <x> <y> <slot>";
                ConsoleCommand::Place {
                    x: arg(&tokens, 1, usage)?,
                    y: arg(&tokens, 2, usage)?,
                    slot: arg(&tokens, 3, usage)?,
                }
            }
            "select" => ConsoleCommand::Select(arg(&tokens, 1, "select <n>")?),
            "craft" => ConsoleCommand::Craft,
            "craftset" => {
                let usage = "craftset <cell> <slot>";
                ConsoleCommand::CraftSet {
                    cell: arg(&tokens, 1, usage)?,
                    slot: arg(&tokens, 2, usage)?,
                }
            }
            "attack" => ConsoleCommand::Attack,
            "discard" => ConsoleCommand::Discard(arg(&tokens, 1, "discard <slot>")?),
            "eat" => ConsoleCommand::Eat(arg(&tokens, 1, "eat <slot>")?),
            "keys" => ConsoleCommand::Keys(parse_keys(tokens[1..].iter().copied())?),
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(format!("Unknown command '{other}'")),
        };
        Ok(Some(cmd))
    }
}

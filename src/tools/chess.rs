//! Chess position tools.
//!
//! Only Forsyth-Edwards Notation (FEN) handling lives here: structural
//! validation and a readable rendering of a position. Move generation and
//! analysis belong to an external engine behind [`super::ToolService`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;

use super::{require_str, Tool, ToolCallResult, ToolDescriptor};
use crate::error::ToolError;

/// Why a FEN string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FenError {
    /// Wrong number of space-separated fields.
    #[error("expected 6 fields, found {0}")]
    FieldCount(usize),
    /// Piece placement does not describe 8 ranks.
    #[error("expected 8 ranks, found {0}")]
    RankCount(usize),
    /// A rank does not cover exactly 8 files.
    #[error("rank {rank} covers {files} files instead of 8")]
    RankWidth {
        /// Rank number (8 is the first rank in the string).
        rank: u8,
        /// Files covered.
        files: u32,
    },
    /// Unknown character in piece placement.
    #[error("invalid piece character '{0}'")]
    InvalidPiece(char),
    /// A side does not have exactly one king.
    #[error("{side} must have exactly one king, found {count}")]
    KingCount {
        /// Side name.
        side: Color,
        /// Kings found.
        count: usize,
    },
    /// A pawn stands on the first or eighth rank.
    #[error("pawn on back rank {0}")]
    PawnOnBackRank(u8),
    /// Active colour is neither `w` nor `b`.
    #[error("invalid side to move '{0}'")]
    SideToMove(String),
    /// Malformed castling availability.
    #[error("invalid castling rights '{0}'")]
    Castling(String),
    /// Malformed or impossible en passant target square.
    #[error("invalid en passant square '{0}'")]
    EnPassant(String),
    /// A move counter is not a valid number.
    #[error("invalid {field} '{value}'")]
    Counter {
        /// Which counter.
        field: &'static str,
        /// The offending text.
        value: String,
    },
}

/// Side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// White.
    White,
    /// Black.
    Black,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::White => write!(f, "white"),
            Self::Black => write!(f, "black"),
        }
    }
}

/// A parsed, structurally valid position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    /// Board squares, rank 8 first, `None` for empty squares.
    pub board: [[Option<char>; 8]; 8],
    /// Side to move.
    pub side_to_move: Color,
    /// Castling availability, `-` when none.
    pub castling: String,
    /// En passant target square, if any.
    pub en_passant: Option<String>,
    /// Half-move clock for the fifty-move rule.
    pub halfmove_clock: u32,
    /// Full-move number, starting at 1.
    pub fullmove_number: u32,
}

const PIECES: &str = "pnbrqkPNBRQK";

impl FromStr for Position {
    type Err = FenError;

    fn from_str(fen: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(FenError::FieldCount(fields.len()));
        }

        let board = parse_placement(fields[0])?;

        let side_to_move = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(FenError::SideToMove(other.to_string())),
        };

        let castling = parse_castling(fields[2])?;
        let en_passant = parse_en_passant(fields[3], side_to_move)?;

        let halfmove_clock = fields[4].parse::<u32>().map_err(|_| FenError::Counter {
            field: "halfmove clock",
            value: fields[4].to_string(),
        })?;
        let fullmove_number = match fields[5].parse::<u32>() {
            Ok(n) if n >= 1 => n,
            _ => {
                return Err(FenError::Counter {
                    field: "fullmove number",
                    value: fields[5].to_string(),
                })
            }
        };

        Ok(Self {
            board,
            side_to_move,
            castling,
            en_passant,
            halfmove_clock,
            fullmove_number,
        })
    }
}

fn parse_placement(placement: &str) -> Result<[[Option<char>; 8]; 8], FenError> {
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(FenError::RankCount(ranks.len()));
    }

    let mut board = [[None; 8]; 8];
    for (row, rank) in ranks.iter().enumerate() {
        // row 0 is rank 8
        let rank_number = 8 - u8::try_from(row).unwrap_or(0);
        let mut file: u32 = 0;
        for c in rank.chars() {
            if let Some(skip) = c.to_digit(10) {
                if !(1..=8).contains(&skip) {
                    return Err(FenError::InvalidPiece(c));
                }
                file += skip;
            } else if PIECES.contains(c) {
                if (c == 'p' || c == 'P') && (rank_number == 1 || rank_number == 8) {
                    return Err(FenError::PawnOnBackRank(rank_number));
                }
                if let Some(square) = usize::try_from(file)
                    .ok()
                    .and_then(|f| board[row].get_mut(f))
                {
                    *square = Some(c);
                }
                file += 1;
            } else {
                return Err(FenError::InvalidPiece(c));
            }
        }
        if file != 8 {
            return Err(FenError::RankWidth {
                rank: rank_number,
                files: file,
            });
        }
    }

    for (side, king) in [(Color::White, 'K'), (Color::Black, 'k')] {
        let count = board.iter().flatten().filter(|s| **s == Some(king)).count();
        if count != 1 {
            return Err(FenError::KingCount { side, count });
        }
    }

    Ok(board)
}

fn parse_castling(castling: &str) -> Result<String, FenError> {
    if castling == "-" {
        return Ok(castling.to_string());
    }

    // Subset of "KQkq", in that order, without repeats.
    let mut remaining = "KQkq".chars();
    for c in castling.chars() {
        if !remaining.by_ref().any(|r| r == c) {
            return Err(FenError::Castling(castling.to_string()));
        }
    }
    Ok(castling.to_string())
}

fn parse_en_passant(square: &str, side_to_move: Color) -> Result<Option<String>, FenError> {
    if square == "-" {
        return Ok(None);
    }

    let mut chars = square.chars();
    let (Some(file), Some(rank), None) = (chars.next(), chars.next(), chars.next()) else {
        return Err(FenError::EnPassant(square.to_string()));
    };

    let expected_rank = match side_to_move {
        Color::White => '6',
        Color::Black => '3',
    };
    if !('a'..='h').contains(&file) || rank != expected_rank {
        return Err(FenError::EnPassant(square.to_string()));
    }

    Ok(Some(square.to_string()))
}

impl Position {
    /// Renders the board as an 8x8 character grid with rank and file labels.
    #[must_use]
    pub fn render_ascii(&self) -> String {
        let mut out = String::new();
        for (row, squares) in self.board.iter().enumerate() {
            out.push_str(&format!("{} ", 8 - row));
            for square in squares {
                out.push(' ');
                out.push(square.unwrap_or('.'));
            }
            out.push('\n');
        }
        out.push_str("   a b c d e f g h");
        out
    }
}

/// Returns the chess tools in registration order.
#[must_use]
pub fn tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(ValidateFen), Arc::new(DescribePosition)]
}

fn fen_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "fen": {
                "type": "string",
                "description": "Position in Forsyth-Edwards Notation"
            }
        },
        "required": ["fen"]
    })
}

/// `validate_fen`: reports whether a FEN string is structurally valid.
pub struct ValidateFen;

#[async_trait]
impl Tool for ValidateFen {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "validate_fen".to_string(),
            description: Some(
                "Check whether a FEN string describes a structurally valid chess position. \
                 Returns {valid, fen, sideToMove} or {valid: false, error}."
                    .to_string(),
            ),
            input_schema: fen_schema(),
        }
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<ToolCallResult, ToolError> {
        let fen = require_str("validate_fen", &arguments, "fen")?;
        let report = match fen.parse::<Position>() {
            Ok(position) => json!({
                "valid": true,
                "fen": fen,
                "sideToMove": position.side_to_move.to_string(),
            }),
            Err(e) => json!({
                "valid": false,
                "fen": fen,
                "error": e.to_string(),
            }),
        };
        Ok(ToolCallResult::json(&report))
    }
}

/// `describe_position`: renders a FEN position for humans.
pub struct DescribePosition;

#[async_trait]
impl Tool for DescribePosition {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "describe_position".to_string(),
            description: Some(
                "Render a FEN position as an ASCII board (uppercase = white, lowercase = black) \
                 with side to move, castling rights, en passant square and move counters."
                    .to_string(),
            ),
            input_schema: fen_schema(),
        }
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<ToolCallResult, ToolError> {
        let fen = require_str("describe_position", &arguments, "fen")?;
        let position = fen.parse::<Position>().map_err(|e| ToolError::Execution {
            tool: "describe_position".to_string(),
            message: format!("invalid FEN: {e}"),
        })?;

        let text = format!(
            "{}\n\nSide to move: {}\nCastling: {}\nEn passant: {}\nHalfmove clock: {}\nFullmove number: {}",
            position.render_ascii(),
            position.side_to_move,
            position.castling,
            position.en_passant.as_deref().unwrap_or("-"),
            position.halfmove_clock,
            position.fullmove_number,
        );
        Ok(ToolCallResult::text(text))
    }
}

// src/main.rs
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::error::Error;
use std::fmt;
use std::fs;
use std::io::{self, Write};

// --- Constants ---
const DEFAULT_CONFIG_FILE: &str = "data/chess_pieces.json";
const MIN_BOARD_SIZE: i32 = 4;
const MAX_BOARD_SIZE: i32 = 26;

// The king's home file; castling is only recognized from here.
const KING_HOME_FILE: i32 = 4;

// En passant geometry (rank indices, zero-based).
const WHITE_EP_START_RANK: i32 = 4;
const WHITE_EP_END_RANK: i32 = 5;
const BLACK_EP_START_RANK: i32 = 3;
const BLACK_EP_END_RANK: i32 = 2;

const KNIGHT_OFFSETS: [(i32, i32); 8] = [
    (2, 1), (2, -1), (-2, 1), (-2, -1), (1, 2), (1, -2), (-1, 2), (-1, -2),
];

const ORTHOGONAL_DIRECTIONS: [(i32, i32); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];

const DIAGONAL_DIRECTIONS: [(i32, i32); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

const ALL_DIRECTIONS: [(i32, i32); 8] = [
    (0, 1), (0, -1), (1, 0), (-1, 0), (1, 1), (1, -1), (-1, 1), (-1, -1),
];

lazy_static! {
    // Algebraic coordinate: one file letter followed by a 1- or 2-digit rank.
    static ref POSITION_RE: Regex = Regex::new(r"^([a-z])([0-9]{1,2})$").unwrap();
}

// --- Enums and Basic Structs ---

#[derive(Debug, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
enum Color { White, Black }

impl Color {
    fn opponent(&self) -> Color {
        match self { Color::White => Color::Black, Color::Black => Color::White }
    }

    /// Rank direction pawns of this color advance in.
    fn forward(&self) -> i32 {
        match self { Color::White => 1, Color::Black => -1 }
    }
}

/// Board coordinate: `x` is the file, `y` the rank, both zero-based.
/// Signed so that candidate offsets can be formed before the bounds check
/// rejects them.
#[derive(Debug, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
struct Position {
    x: i32,
    y: i32,
}

impl Position {
    fn new(x: i32, y: i32) -> Self { Position { x, y } }

    fn offset(&self, dx: i32, dy: i32) -> Position {
        Position { x: self.x + dx, y: self.y + dy }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if (0..26).contains(&self.x) && self.y >= 0 {
            write!(f, "{}{}", (b'a' + self.x as u8) as char, self.y + 1)
        } else {
            write!(f, "({},{})", self.x, self.y)
        }
    }
}

/// Piece kinds are matched case-insensitively; names the engine does not
/// recognize are carried through as `Other` and generate no moves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PieceKind {
    Pawn, Knight, Bishop, Rook, Queen, King,
    Teleporter,
    Other(String),
}

impl PieceKind {
    fn parse(name: &str) -> PieceKind {
        match name.to_lowercase().as_str() {
            "pawn" => PieceKind::Pawn,
            "knight" => PieceKind::Knight,
            "bishop" => PieceKind::Bishop,
            "rook" => PieceKind::Rook,
            "queen" => PieceKind::Queen,
            "king" => PieceKind::King,
            "teleporter" => PieceKind::Teleporter,
            other => PieceKind::Other(other.to_string()),
        }
    }

    fn name(&self) -> &str {
        match self {
            PieceKind::Pawn => "pawn",
            PieceKind::Knight => "knight",
            PieceKind::Bishop => "bishop",
            PieceKind::Rook => "rook",
            PieceKind::Queen => "queen",
            PieceKind::King => "king",
            PieceKind::Teleporter => "teleporter",
            PieceKind::Other(name) => name,
        }
    }
}

impl fmt::Display for PieceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Piece {
    kind: PieceKind,
    color: Color,
}

impl Piece {
    fn new(kind: PieceKind, color: Color) -> Self { Piece { kind, color } }

    /// Single-character board symbol; uppercase for White.
    fn symbol(&self) -> char {
        let symbol = match self.kind {
            PieceKind::Knight => 'n', // 'k' is taken by the king
            _ => self.kind.name().chars().next().unwrap_or('?'),
        };
        match self.color {
            Color::White => symbol.to_ascii_uppercase(),
            Color::Black => symbol,
        }
    }
}

// --- Board ---

/// Bounded N x N square storage. The board is the single owner of square
/// state; `Clone` yields the independent deep copy that speculative
/// checkmate/stalemate evaluation relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Board {
    size: i32,
    squares: Vec<Option<Piece>>,
}

impl Board {
    fn new(size: i32) -> Self {
        Board { size, squares: vec![None; (size * size) as usize] }
    }

    fn size(&self) -> i32 { self.size }

    #[inline]
    fn in_bounds(&self, pos: Position) -> bool {
        (0..self.size).contains(&pos.x) && (0..self.size).contains(&pos.y)
    }

    #[inline]
    fn index(&self, pos: Position) -> usize {
        (pos.y * self.size + pos.x) as usize
    }

    /// Returns the occupant of `pos`, or None for empty or out-of-bounds squares.
    fn piece_at(&self, pos: Position) -> Option<&Piece> {
        if !self.in_bounds(pos) { return None; }
        self.squares[self.index(pos)].as_ref()
    }

    fn is_empty(&self, pos: Position) -> bool {
        self.in_bounds(pos) && self.squares[self.index(pos)].is_none()
    }

    /// Places `piece` at `pos`; a `None` piece clears the square.
    fn place_piece(&mut self, piece: Option<Piece>, pos: Position) -> Result<(), BoardError> {
        if !self.in_bounds(pos) {
            return Err(BoardError::OutOfBounds(pos));
        }
        let index = self.index(pos);
        self.squares[index] = piece;
        Ok(())
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = "-".repeat(self.size as usize * 2 + 1);
        writeln!(f, "   +{}+", frame)?;
        for y in (0..self.size).rev() {
            write!(f, "{:2} | ", y + 1)?;
            for x in 0..self.size {
                match self.piece_at(Position::new(x, y)) {
                    Some(piece) => write!(f, "{} ", piece.symbol())?,
                    None => write!(f, ". ")?,
                }
            }
            writeln!(f, "|")?;
        }
        writeln!(f, "   +{}+", frame)?;
        write!(f, "     ")?;
        for x in 0..self.size {
            write!(f, "{} ", (b'a' + x as u8) as char)?;
        }
        writeln!(f)
    }
}

// --- Configuration ---

#[derive(Debug, Deserialize)]
struct GameConfig {
    game_settings: GameSettings,
    #[serde(default)]
    pieces: Vec<PiecePlacement>,
    #[serde(default)]
    portals: Vec<PortalConfig>,
}

#[derive(Debug, Deserialize)]
struct GameSettings {
    board_size: i32,
}

#[derive(Debug, Deserialize)]
struct PiecePlacement {
    #[serde(rename = "type")]
    kind: String,
    color: Color,
    position: Position,
}

#[derive(Debug, Clone, Deserialize)]
struct PortalConfig {
    id: String,
    positions: PortalEndpoints,
    properties: PortalProperties,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct PortalEndpoints {
    entry: Position,
    exit: Position,
}

#[derive(Debug, Clone, Deserialize)]
struct PortalProperties {
    allowed_colors: Vec<Color>,
    cooldown: u32,
}

impl GameConfig {
    fn load_from_file(path: &str) -> Result<GameConfig, ConfigError> {
        let data = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_string(), e))?;
        let config: GameConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the parsed configuration before any game state is built.
    fn validate(&self) -> Result<(), ConfigError> {
        let size = self.game_settings.board_size;
        if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&size) {
            return Err(ConfigError::InvalidBoardSize(size));
        }
        let in_bounds = |pos: Position| (0..size).contains(&pos.x) && (0..size).contains(&pos.y);

        for placement in &self.pieces {
            if !in_bounds(placement.position) {
                return Err(ConfigError::PiecePlacement(placement.kind.clone(), placement.position));
            }
        }

        let mut seen_ids = HashSet::new();
        for portal in &self.portals {
            if !seen_ids.insert(portal.id.clone()) {
                return Err(ConfigError::DuplicatePortalId(portal.id.clone()));
            }
            if !in_bounds(portal.positions.entry) {
                return Err(ConfigError::PortalPlacement(portal.id.clone(), portal.positions.entry));
            }
            if !in_bounds(portal.positions.exit) {
                return Err(ConfigError::PortalPlacement(portal.id.clone(), portal.positions.exit));
            }
            if portal.positions.entry == portal.positions.exit {
                return Err(ConfigError::DegeneratePortal(portal.id.clone()));
            }
        }
        Ok(())
    }
}

// --- Portal System ---

/// Reasons a portal move is refused. Reported individually on the console;
/// callers of `validate_portal_move` only see the collapsed boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortalRejection {
    OnCooldown(u32),
    NotPermitted(Color),
}

/// Owns the configured portals, their remaining-cooldown counters and the
/// queue of pending decrement tokens. Counters only move toward zero through
/// `advance_cooldowns`, one token (and therefore at most one portal) per call.
#[derive(Debug, Clone)]
struct PortalSystem {
    portals: Vec<PortalConfig>,
    cooldowns: HashMap<String, u32>,
    cooldown_queue: VecDeque<String>,
}

impl PortalSystem {
    fn new(portals: Vec<PortalConfig>) -> Self {
        let cooldowns = portals.iter().map(|p| (p.id.clone(), 0)).collect();
        PortalSystem { portals, cooldowns, cooldown_queue: VecDeque::new() }
    }

    /// The portal whose entry/exit pair matches (start, end) exactly.
    /// Directional: the reverse pair does not match.
    fn portal_at(&self, start: Position, end: Position) -> Option<&PortalConfig> {
        self.portals.iter()
            .find(|p| p.positions.entry == start && p.positions.exit == end)
    }

    fn is_portal_move(&self, start: Position, end: Position) -> bool {
        self.portal_at(start, end).is_some()
    }

    /// Exits of every portal whose entry sits on `from`. Extra edges for the
    /// teleporter reachability walk.
    fn exits_from(&self, from: Position) -> impl Iterator<Item = Position> + '_ {
        self.portals.iter()
            .filter(move |p| p.positions.entry == from)
            .map(|p| p.positions.exit)
    }

    fn remaining_cooldown(&self, id: &str) -> u32 {
        self.cooldowns.get(id).copied().unwrap_or(0)
    }

    fn check_portal_move(&self, kind: &PieceKind, start: Position, end: Position,
                         color: Color, board: &Board) -> Result<(), PortalRejection> {
        // Re-confirm the mover is actually standing on the entry square.
        let occupant = match board.piece_at(start) {
            Some(piece) => piece,
            None => return Err(PortalRejection::NotPermitted(color)),
        };
        if occupant.kind != *kind || occupant.color != color {
            return Err(PortalRejection::NotPermitted(color));
        }

        let portal = match self.portal_at(start, end) {
            Some(portal) => portal,
            None => return Err(PortalRejection::NotPermitted(color)),
        };

        let remaining = self.remaining_cooldown(&portal.id);
        if remaining > 0 {
            return Err(PortalRejection::OnCooldown(remaining));
        }
        if !portal.properties.allowed_colors.contains(&color) {
            return Err(PortalRejection::NotPermitted(color));
        }
        Ok(())
    }

    /// Validates a portal transit: source re-check, cooldown gate, then the
    /// color policy. Rejection reasons are printed; the verdict is a boolean.
    fn validate_portal_move(&self, kind: &PieceKind, start: Position, end: Position,
                            color: Color, board: &Board) -> bool {
        match self.check_portal_move(kind, start, end, color, board) {
            Ok(()) => true,
            Err(PortalRejection::OnCooldown(remaining)) => {
                if let Some(portal) = self.portal_at(start, end) {
                    println!("\nPortal {} is on cooldown! Remaining turns: {}", portal.id, remaining);
                    println!("This portal cannot be used by any piece right now.");
                }
                false
            }
            Err(PortalRejection::NotPermitted(color)) => {
                println!("\nPortal Error: This portal cannot be used by {:?} pieces!", color);
                false
            }
        }
    }

    /// Relocates the occupant of `start` to `end` and arms the cooldown:
    /// the counter jumps to the full cooldown length and one decrement token
    /// per turn of cooldown is enqueued. Validation must happen first.
    fn handle_portal_move(&mut self, start: Position, end: Position,
                          board: &mut Board) -> Result<(), BoardError> {
        let portal = match self.portal_at(start, end) {
            Some(portal) => portal.clone(),
            None => return Ok(()),
        };
        let occupant = match board.piece_at(start) {
            Some(piece) => piece.clone(),
            None => return Ok(()),
        };

        board.place_piece(Some(occupant), end)?;
        board.place_piece(None, start)?;

        self.cooldowns.insert(portal.id.clone(), portal.properties.cooldown);
        for _ in 0..portal.properties.cooldown {
            self.cooldown_queue.push_back(portal.id.clone());
        }
        Ok(())
    }

    /// One scheduler tick: dequeues a single token and decrements the counter
    /// of the portal that owns it. Portals recover in strict global order,
    /// never in parallel.
    fn advance_cooldowns(&mut self) {
        let portal_id = match self.cooldown_queue.pop_front() {
            Some(id) => id,
            None => return,
        };

        if let Some(counter) = self.cooldowns.get_mut(&portal_id) {
            if *counter > 0 {
                *counter -= 1;
                if *counter == 0 {
                    println!("\nPortal {} is now ready for use!", portal_id);
                }
            }
        }

        let mut cooling: Vec<(&String, &u32)> =
            self.cooldowns.iter().filter(|(_, c)| **c > 0).collect();
        if !cooling.is_empty() {
            cooling.sort();
            println!("\n--- PORTAL COOLDOWN STATUS ---");
            for (id, remaining) in cooling {
                println!("{} -> Remaining cooldown: {} turns", id, remaining);
            }
        }
    }
}

// --- Move Validator ---

/// Squares a piece of `kind` could move to from `pos`, by raw geometry alone.
/// King-safety is not considered here; unknown kinds (and the teleporter,
/// whose reach is portal-driven) yield nothing.
fn reachable_squares(kind: &PieceKind, pos: Position, color: Color, board: &Board) -> Vec<Position> {
    let mut edges = Vec::new();
    match kind {
        PieceKind::Pawn => pawn_squares(pos, color, board, &mut edges),
        PieceKind::Knight => step_squares(pos, color, board, &KNIGHT_OFFSETS, &mut edges),
        PieceKind::Bishop => ray_squares(pos, color, board, &DIAGONAL_DIRECTIONS, &mut edges),
        PieceKind::Rook => ray_squares(pos, color, board, &ORTHOGONAL_DIRECTIONS, &mut edges),
        PieceKind::Queen => ray_squares(pos, color, board, &ALL_DIRECTIONS, &mut edges),
        PieceKind::King => step_squares(pos, color, board, &ALL_DIRECTIONS, &mut edges),
        PieceKind::Teleporter | PieceKind::Other(_) => {}
    }
    edges
}

fn pawn_squares(pos: Position, color: Color, board: &Board, edges: &mut Vec<Position>) {
    let forward = color.forward();

    let forward_one = pos.offset(0, forward);
    if board.is_empty(forward_one) {
        edges.push(forward_one);

        // Double advance, only from the color's home rank.
        let home_rank = match color {
            Color::White => 1,
            Color::Black => board.size() - 2,
        };
        if pos.y == home_rank {
            let forward_two = pos.offset(0, 2 * forward);
            if board.is_empty(forward_two) {
                edges.push(forward_two);
            }
        }
    }

    // Diagonal squares are reachable only as captures.
    for dx in [-1, 1] {
        let capture = pos.offset(dx, forward);
        if let Some(target) = board.piece_at(capture) {
            if target.color != color {
                edges.push(capture);
            }
        }
    }
}

fn step_squares(pos: Position, color: Color, board: &Board,
                offsets: &[(i32, i32)], edges: &mut Vec<Position>) {
    for &(dx, dy) in offsets {
        let target = pos.offset(dx, dy);
        if !board.in_bounds(target) { continue; }
        match board.piece_at(target) {
            Some(occupant) if occupant.color == color => {}
            _ => edges.push(target),
        }
    }
}

fn ray_squares(pos: Position, color: Color, board: &Board,
               directions: &[(i32, i32)], edges: &mut Vec<Position>) {
    for &(dx, dy) in directions {
        let mut current = pos;
        loop {
            current = current.offset(dx, dy);
            if !board.in_bounds(current) { break; }
            match board.piece_at(current) {
                None => edges.push(current),
                Some(occupant) => {
                    // The blocking square is reachable only when it holds an
                    // enemy; either way the ray stops here.
                    if occupant.color != color {
                        edges.push(current);
                    }
                    break;
                }
            }
        }
    }
}

/// Validates a single start -> end transition for a piece of `kind` and
/// `color`. Each check short-circuits to a rejection; king-safety is the
/// caller's concern.
fn is_valid_move(kind: &PieceKind, start: Position, end: Position, color: Color,
                 board: &Board, portals: &PortalSystem) -> bool {
    if !board.in_bounds(start) || !board.in_bounds(end) {
        return false;
    }

    match board.piece_at(start) {
        Some(piece) if piece.kind == *kind && piece.color == color => {}
        _ => return false,
    }

    if let Some(occupant) = board.piece_at(end) {
        if occupant.color == color {
            return false;
        }
    }

    if *kind == PieceKind::King && (end.x - start.x).abs() == 2 && end.y == start.y {
        return validate_castling(start, end, color, board);
    }

    if *kind == PieceKind::Pawn {
        if is_en_passant_move(start, end, color, board) {
            return true;
        }

        // Back-rank arrival: legal iff reachable. Which piece the pawn
        // becomes is chosen elsewhere.
        let back_rank = match color {
            Color::White => board.size() - 1,
            Color::Black => 0,
        };
        if end.y == back_rank {
            return reachable_squares(kind, start, color, board).contains(&end);
        }
    }

    // Portal transit bypasses normal geometry entirely.
    if portals.is_portal_move(start, end) {
        println!("\nPortal move detected!");
        return portals.validate_portal_move(kind, start, end, color, board);
    }

    if *kind == PieceKind::Teleporter {
        return teleporter_can_reach(start, end, color, board, portals);
    }

    reachable_squares(kind, start, color, board).contains(&end)
}

/// Castling: king moves two files along its home rank toward a rook sitting
/// on the matching corner, with nothing strictly between them. The engine
/// keeps no has-moved flags, so any king/rook pair found in home position is
/// treated as eligible.
fn validate_castling(start: Position, end: Position, color: Color, board: &Board) -> bool {
    let home_rank = match color {
        Color::White => 0,
        Color::Black => board.size() - 1,
    };
    if start.x != KING_HOME_FILE || start.y != home_rank {
        return false;
    }

    let is_kingside = end.x > start.x;
    let rook_x = if is_kingside { board.size() - 1 } else { 0 };

    match board.piece_at(Position::new(rook_x, home_rank)) {
        Some(piece) if piece.kind == PieceKind::Rook && piece.color == color => {}
        _ => return false,
    }

    let step = if is_kingside { 1 } else { -1 };
    let mut x = start.x + step;
    while x != rook_x {
        if !board.is_empty(Position::new(x, home_rank)) {
            return false;
        }
        x += step;
    }
    true
}

/// En passant precondition: fifth-rank origin, one diagonal step onto the
/// sixth rank, empty destination, and an enemy pawn beside the origin.
/// Whether that pawn double-stepped on the immediately preceding turn is
/// deliberately not checked.
fn is_en_passant_move(start: Position, end: Position, color: Color, board: &Board) -> bool {
    let (start_rank, end_rank) = match color {
        Color::White => (WHITE_EP_START_RANK, WHITE_EP_END_RANK),
        Color::Black => (BLACK_EP_START_RANK, BLACK_EP_END_RANK),
    };
    if start.y != start_rank {
        return false;
    }
    if (end.x - start.x).abs() != 1 || end.y != end_rank {
        return false;
    }
    if !board.is_empty(end) {
        return false;
    }

    match board.piece_at(Position::new(end.x, start.y)) {
        Some(piece) => piece.kind == PieceKind::Pawn && piece.color != color,
        None => false,
    }
}

/// Breadth-first reachability for the teleporter. Normal edges come from
/// `reachable_squares`, pruned so that only the final hop may land on an
/// occupied enemy square; whenever the frontier sits on a portal entry, that
/// portal's exit is an extra edge. Other kinds never walk this graph.
fn teleporter_can_reach(start: Position, end: Position, color: Color,
                        board: &Board, portals: &PortalSystem) -> bool {
    let mut queue = VecDeque::new();
    let mut visited = HashSet::new();
    queue.push_back(start);
    visited.insert(start);

    while let Some(current) = queue.pop_front() {
        if current == end {
            return true;
        }

        for exit in portals.exits_from(current) {
            if board.in_bounds(exit) && visited.insert(exit) {
                queue.push_back(exit);
            }
        }

        for next in reachable_squares(&PieceKind::Teleporter, current, color, board) {
            if !board.in_bounds(next) || visited.contains(&next) {
                continue;
            }
            // Intermediate hops must be empty.
            if !board.is_empty(next) && next != end {
                continue;
            }
            visited.insert(next);
            queue.push_back(next);
        }
    }
    false
}

// --- Move Records ---

#[derive(Debug, Clone, PartialEq, Eq)]
struct MoveRecord {
    start: Position,
    end: Position,
    piece: Piece,
    /// The victim and the square it stood on. En passant removes a pawn from
    /// a square other than `end`, so the position is recorded alongside.
    captured: Option<(Piece, Position)>,
}

impl fmt::Display for MoveRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.piece.kind, self.start, self.end)?;
        if let Some((victim, _)) = &self.captured {
            write!(f, " (captured {})", victim.kind)?;
        }
        Ok(())
    }
}

/// Derived game state after a completed move, reported to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MoveOutcome {
    check: bool,
    checkmate: bool,
    stalemate: bool,
}

// --- Game Manager ---

/// Orchestrates the validator and the portal system against the board:
/// applies validated moves, keeps the undo history, and answers the
/// check/checkmate/stalemate queries.
#[derive(Debug)]
struct Game {
    board: Board,
    portals: PortalSystem,
    move_history: Vec<MoveRecord>,
    turn: Color,
}

impl Game {
    fn new(config: GameConfig) -> Result<Game, ConfigError> {
        config.validate()?;

        let mut board = Board::new(config.game_settings.board_size);
        for placement in &config.pieces {
            let piece = Piece::new(PieceKind::parse(&placement.kind), placement.color);
            board.place_piece(Some(piece), placement.position)
                .map_err(|_| ConfigError::PiecePlacement(placement.kind.clone(), placement.position))?;
        }

        Ok(Game {
            board,
            portals: PortalSystem::new(config.portals),
            move_history: Vec::new(),
            turn: Color::White,
        })
    }

    fn find_king(board: &Board, color: Color) -> Option<Position> {
        for y in 0..board.size() {
            for x in 0..board.size() {
                let pos = Position::new(x, y);
                if let Some(piece) = board.piece_at(pos) {
                    if piece.kind == PieceKind::King && piece.color == color {
                        return Some(pos);
                    }
                }
            }
        }
        None
    }

    /// Whether `color`'s king is attacked on the given board. A missing king
    /// counts as not in check. The threat scan covers queen, rook, bishop,
    /// knight and pawn; the opposing king is excluded, and portal transit is
    /// not treated as a checking path.
    fn board_in_check(board: &Board, portals: &PortalSystem, color: Color) -> bool {
        let king_pos = match Self::find_king(board, color) {
            Some(pos) => pos,
            None => return false,
        };

        let checking_kinds = [
            PieceKind::Queen, PieceKind::Rook, PieceKind::Bishop,
            PieceKind::Knight, PieceKind::Pawn,
        ];

        for y in 0..board.size() {
            for x in 0..board.size() {
                let pos = Position::new(x, y);
                let piece = match board.piece_at(pos) {
                    Some(piece) if piece.color != color => piece,
                    _ => continue,
                };
                if !checking_kinds.contains(&piece.kind) {
                    continue;
                }
                if portals.is_portal_move(pos, king_pos) {
                    continue;
                }
                if is_valid_move(&piece.kind, pos, king_pos, piece.color, board, portals) {
                    return true;
                }
            }
        }
        false
    }

    fn is_in_check(&self, color: Color) -> bool {
        Self::board_in_check(&self.board, &self.portals, color)
    }

    /// True iff `color` is in check and no (piece, destination) candidate
    /// leaves it out of check. Every legal candidate is applied to a
    /// disposable duplicate of the board and re-evaluated there.
    fn is_checkmate(&self, color: Color) -> bool {
        if !self.is_in_check(color) {
            return false;
        }

        for y in 0..self.board.size() {
            for x in 0..self.board.size() {
                let start = Position::new(x, y);
                let piece = match self.board.piece_at(start) {
                    Some(piece) if piece.color == color => piece.clone(),
                    _ => continue,
                };

                for dy in 0..self.board.size() {
                    for dx in 0..self.board.size() {
                        let end = Position::new(dx, dy);
                        if start == end { continue; }
                        if !is_valid_move(&piece.kind, start, end, color, &self.board, &self.portals) {
                            continue;
                        }

                        let mut speculative = self.board.clone();
                        if speculative.place_piece(Some(piece.clone()), end).is_err()
                            || speculative.place_piece(None, start).is_err() {
                            continue;
                        }
                        if !Self::board_in_check(&speculative, &self.portals, color) {
                            return false; // a saving move exists
                        }
                    }
                }
            }
        }
        true
    }

    /// True iff `color` is not in check and none of its pieces has any legal
    /// destination anywhere on the board. The validator does not reject moves
    /// that expose the mover's own king, so each candidate is replayed on a
    /// duplicate before it counts as an available move.
    fn is_stalemate(&self, color: Color) -> bool {
        if self.is_in_check(color) {
            return false;
        }

        for y in 0..self.board.size() {
            for x in 0..self.board.size() {
                let start = Position::new(x, y);
                let piece = match self.board.piece_at(start) {
                    Some(piece) if piece.color == color => piece.clone(),
                    _ => continue,
                };

                for dy in 0..self.board.size() {
                    for dx in 0..self.board.size() {
                        let end = Position::new(dx, dy);
                        if start == end { continue; }
                        if !is_valid_move(&piece.kind, start, end, color, &self.board, &self.portals) {
                            continue;
                        }

                        let mut speculative = self.board.clone();
                        if speculative.place_piece(Some(piece.clone()), end).is_err()
                            || speculative.place_piece(None, start).is_err() {
                            continue;
                        }
                        if !Self::board_in_check(&speculative, &self.portals, color) {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Validates and applies one move for the player to move. On success the
    /// move is recorded, the cooldown scheduler ticks once for the completed
    /// turn, the opponent's derived state is evaluated, and the turn flips.
    /// On rejection nothing changes.
    fn submit_move(&mut self, start: Position, end: Position,
                   kind_name: &str) -> Result<MoveOutcome, MoveError> {
        let piece = match self.board.piece_at(start) {
            Some(piece) => piece.clone(),
            None => return Err(MoveError::NoPieceAtSquare(start)),
        };
        if piece.color != self.turn {
            return Err(MoveError::NotYourTurn { turn: self.turn, selected: piece.color });
        }
        let kind = PieceKind::parse(kind_name);
        if piece.kind != kind {
            return Err(MoveError::PieceMismatch {
                found: piece.kind.name().to_string(),
                requested: kind_name.to_string(),
            });
        }

        if !is_valid_move(&kind, start, end, piece.color, &self.board, &self.portals) {
            if self.portals.is_portal_move(start, end) {
                return Err(MoveError::PortalRejected { start, end });
            }
            return Err(MoveError::IllegalMove { piece: kind.name().to_string(), start, end });
        }

        let captured = self.apply_move(&piece, start, end)
            .map_err(MoveError::Apply)?;

        self.move_history.push(MoveRecord { start, end, piece, captured });

        // The completed-turn scheduler tick.
        self.portals.advance_cooldowns();

        let opponent = self.turn.opponent();
        let checkmate = self.is_checkmate(opponent);
        let stalemate = !checkmate && self.is_stalemate(opponent);
        let check = checkmate || self.is_in_check(opponent);
        self.turn = opponent;

        Ok(MoveOutcome { check, checkmate, stalemate })
    }

    /// Moves the piece on the board, routing portal transit through the
    /// portal system and removing the en passant victim from its own square.
    fn apply_move(&mut self, piece: &Piece, start: Position,
                  end: Position) -> Result<Option<(Piece, Position)>, BoardError> {
        if self.portals.is_portal_move(start, end) {
            let captured = self.board.piece_at(end).cloned().map(|victim| (victim, end));
            self.portals.handle_portal_move(start, end, &mut self.board)?;
            return Ok(captured);
        }

        if piece.kind == PieceKind::Pawn && is_en_passant_move(start, end, piece.color, &self.board) {
            let victim_pos = Position::new(end.x, start.y);
            let victim = self.board.piece_at(victim_pos).cloned();
            self.board.place_piece(None, victim_pos)?;
            self.board.place_piece(Some(piece.clone()), end)?;
            self.board.place_piece(None, start)?;
            return Ok(victim.map(|v| (v, victim_pos)));
        }

        let captured = self.board.piece_at(end).cloned().map(|victim| (victim, end));
        self.board.place_piece(Some(piece.clone()), end)?;
        self.board.place_piece(None, start)?;
        Ok(captured)
    }

    /// Retracts the most recent move: the mover returns to its start square
    /// and the victim (if any) to the square it was captured on. A failed
    /// restoration puts the record back and surfaces the error. Cooldown
    /// state is not rolled back; undo advances the scheduler one further
    /// tick, mirroring a turn having completed.
    fn undo_move(&mut self) -> Result<MoveRecord, UndoError> {
        let record = match self.move_history.pop() {
            Some(record) => record,
            None => return Err(UndoError::EmptyHistory),
        };

        let result = (|| -> Result<(), BoardError> {
            self.board.place_piece(Some(record.piece.clone()), record.start)?;
            match &record.captured {
                Some((victim, pos)) => {
                    if *pos != record.end {
                        self.board.place_piece(None, record.end)?;
                    }
                    self.board.place_piece(Some(victim.clone()), *pos)?;
                }
                None => {
                    self.board.place_piece(None, record.end)?;
                }
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.portals.advance_cooldowns();
                Ok(record)
            }
            Err(e) => {
                self.move_history.push(record);
                Err(UndoError::RestoreFailure(e))
            }
        }
    }

    fn flip_turn(&mut self) {
        self.turn = self.turn.opponent();
    }
}

// --- Custom Error Types ---

#[derive(Debug)]
enum BoardError {
    OutOfBounds(Position),
}

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardError::OutOfBounds(pos) => write!(f, "Square {} is outside the board.", pos),
        }
    }
}
impl Error for BoardError {}

#[derive(Debug)]
enum ConfigError {
    Io(String, io::Error),
    Parse(serde_json::Error),
    InvalidBoardSize(i32),
    PiecePlacement(String, Position),
    PortalPlacement(String, Position),
    DuplicatePortalId(String),
    DegeneratePortal(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Failed to read configuration file '{}': {}", path, e),
            ConfigError::Parse(e) => write!(f, "Failed to parse configuration: {}", e),
            ConfigError::InvalidBoardSize(size) =>
                write!(f, "Invalid board size {}: must be between {} and {}.", size, MIN_BOARD_SIZE, MAX_BOARD_SIZE),
            ConfigError::PiecePlacement(kind, pos) =>
                write!(f, "Piece '{}' is placed outside the board at {}.", kind, pos),
            ConfigError::PortalPlacement(id, pos) =>
                write!(f, "Portal '{}' has an endpoint outside the board at {}.", id, pos),
            ConfigError::DuplicatePortalId(id) => write!(f, "Duplicate portal id '{}'.", id),
            ConfigError::DegeneratePortal(id) =>
                write!(f, "Portal '{}' has identical entry and exit squares.", id),
        }
    }
}
impl Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self { ConfigError::Parse(e) }
}

#[derive(Debug)]
enum MoveError {
    NoPieceAtSquare(Position),
    NotYourTurn { turn: Color, selected: Color },
    PieceMismatch { found: String, requested: String },
    IllegalMove { piece: String, start: Position, end: Position },
    PortalRejected { start: Position, end: Position },
    Apply(BoardError),
}

impl fmt::Display for MoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveError::NoPieceAtSquare(pos) => write!(f, "No piece at starting position {}.", pos),
            MoveError::NotYourTurn { turn, selected } =>
                write!(f, "{:?} player's turn. {:?} piece selected.", turn, selected),
            MoveError::PieceMismatch { found, requested } =>
                write!(f, "Piece at starting position ({}) does not match specified piece ({}).", found, requested),
            MoveError::IllegalMove { piece, start, end } =>
                write!(f, "Invalid move: {} from {} to {}.", piece, start, end),
            MoveError::PortalRejected { start, end } =>
                write!(f, "Portal move {} -> {} refused: cooldown or color restriction applies.", start, end),
            MoveError::Apply(e) => write!(f, "Failed to apply move: {}", e),
        }
    }
}
impl Error for MoveError {}

#[derive(Debug)]
enum UndoError {
    EmptyHistory,
    RestoreFailure(BoardError),
}

impl fmt::Display for UndoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndoError::EmptyHistory => write!(f, "No moves to undo."),
            UndoError::RestoreFailure(e) => write!(f, "Error undoing move: {}", e),
        }
    }
}
impl Error for UndoError {}

impl From<BoardError> for UndoError {
    fn from(e: BoardError) -> Self { UndoError::RestoreFailure(e) }
}

#[derive(Debug)]
enum CommandError {
    UnknownCommand(String),
    MissingArgument(&'static str),
    InvalidPosition(String),
    Io(io::Error),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::UnknownCommand(cmd) =>
                write!(f, "Unknown command: '{}'. Type 'help' for commands.", cmd),
            CommandError::MissingArgument(what) =>
                write!(f, "Missing {}. Example: move a1 b2 king", what),
            CommandError::InvalidPosition(s) =>
                write!(f, "Invalid position '{}'. Example: a1, b2 (within bounds)", s),
            CommandError::Io(e) => write!(f, "Input/Output error: {}", e),
        }
    }
}
impl Error for CommandError {}

impl From<io::Error> for CommandError {
    fn from(e: io::Error) -> Self { CommandError::Io(e) }
}

// --- Input Parsing ---

#[derive(Debug, PartialEq, Eq)]
enum UserInput {
    Move { start: Position, end: Position, piece: String },
    Undo,
    History,
    Help,
    Quit,
}

/// Parses an algebraic coordinate ("a1".."z26") against the board size.
fn parse_position(input: &str, board_size: i32) -> Result<Position, CommandError> {
    let lower = input.to_lowercase();
    let captures = POSITION_RE.captures(&lower)
        .ok_or_else(|| CommandError::InvalidPosition(input.to_string()))?;

    let file_char = captures[1].chars().next()
        .ok_or_else(|| CommandError::InvalidPosition(input.to_string()))?;
    let x = (file_char as u8 - b'a') as i32;
    let rank: i32 = captures[2].parse()
        .map_err(|_| CommandError::InvalidPosition(input.to_string()))?;
    let y = rank - 1; // players count ranks from 1

    if !(0..board_size).contains(&x) || !(0..board_size).contains(&y) {
        return Err(CommandError::InvalidPosition(input.to_string()));
    }
    Ok(Position::new(x, y))
}

fn parse_user_input(input: &str, board_size: i32) -> Result<UserInput, CommandError> {
    let mut parts = input.split_whitespace();
    let command_word = parts.next().unwrap_or("").to_lowercase();

    match command_word.as_str() {
        "undo" => Ok(UserInput::Undo),
        "history" => Ok(UserInput::History),
        "help" | "?" => Ok(UserInput::Help),
        "quit" | "exit" => Ok(UserInput::Quit),
        "move" => {
            let start_str = parts.next().ok_or(CommandError::MissingArgument("start position"))?;
            let end_str = parts.next().ok_or(CommandError::MissingArgument("end position"))?;
            let piece = parts.next().ok_or(CommandError::MissingArgument("piece name"))?;
            let start = parse_position(start_str, board_size)?;
            let end = parse_position(end_str, board_size)?;
            Ok(UserInput::Move { start, end, piece: piece.to_string() })
        }
        _ => Err(CommandError::UnknownCommand(input.to_string())),
    }
}

// --- Main Game Loop ---

fn main() -> Result<(), Box<dyn Error>> {
    let config_path = std::env::args().nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let config = GameConfig::load_from_file(&config_path)?;
    let mut game = Game::new(config)?;

    println!("==============================");
    println!("|       Portal Chess         |");
    println!("==============================");
    println!("Initial board:");
    println!("{}", game.board);
    print_help();

    loop {
        print!("{:?} player's turn > ", game.turn);
        io::stdout().flush()?;

        let mut input_line = String::new();
        match io::stdin().read_line(&mut input_line) {
            Ok(0) => {
                println!("\nEnd of input detected. Game ended.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("{} Try again or use 'quit'.", CommandError::from(e));
                continue;
            }
        }

        let trimmed = input_line.trim();
        if trimmed.is_empty() {
            println!("Empty command. Example: move a1 b2 king");
            continue;
        }

        match parse_user_input(trimmed, game.board.size()) {
            Ok(UserInput::Move { start, end, piece }) => {
                match game.submit_move(start, end, &piece) {
                    Ok(outcome) => {
                        println!("Move successful: {} -> {}", start, end);
                        println!("{}", game.board);
                        if outcome.checkmate {
                            println!("{:?} checkmate! Game over.", game.turn.opponent());
                            break;
                        }
                        if outcome.stalemate {
                            println!("Game ended in stalemate.");
                            break;
                        }
                        if outcome.check {
                            println!("{:?} is in check!", game.turn);
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
            Ok(UserInput::Undo) => {
                match game.undo_move() {
                    Ok(record) => println!("Move undone: {}", record),
                    Err(e) => println!("{}", e),
                }
                println!("{}", game.board);
                // The turn goes back regardless of whether anything was undone.
                game.flip_turn();
            }
            Ok(UserInput::History) => {
                if game.move_history.is_empty() {
                    println!("No moves played yet.");
                } else {
                    for (number, record) in game.move_history.iter().enumerate() {
                        println!("{:3}. {:?} {}", number + 1, record.piece.color, record);
                    }
                }
            }
            Ok(UserInput::Help) => print_help(),
            Ok(UserInput::Quit) => {
                println!("Game ended.");
                break;
            }
            Err(e) => println!("{}", e),
        }
    }

    Ok(())
}

/// Prints available commands.
fn print_help() {
    println!("\nAvailable Commands:");
    println!("  move <start> <end> <piece>  Move a piece (e.g., move a1 b2 king).");
    println!("  undo                        Retract the last move; the turn passes back.");
    println!("  history                     List the moves played so far.");
    println!("  help                        Show this help message.");
    println!("  quit / exit                 Exit the game.");
    println!();
}

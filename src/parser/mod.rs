//! HTML extraction for index pages and player profiles.

pub mod index;
pub mod player;
pub mod table;

pub use index::{extract_index, index_page_url};
pub use player::{extract_player, extract_player_at};

//! Core identity and parameter types shared by every other crate in the node.

pub mod buf;
pub mod party;

pub mod prelude {
    pub use crate::buf::{Buf32, Buf64};
    pub use crate::party::{ContestationPeriod, HeadId, HeadParameters, Party};
}

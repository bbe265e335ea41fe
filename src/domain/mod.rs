pub mod comment;
pub mod ledger;
pub mod track;

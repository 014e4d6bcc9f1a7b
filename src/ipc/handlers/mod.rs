pub mod accounts;
pub mod admit_cards;
pub mod core;
pub mod documents;
pub mod exams;
pub mod fees;
pub mod notices;
pub mod results;
pub mod students;
pub mod subjects;

//! SeaORM entity definitions

pub mod dlock;

pub mod prelude {
    pub use super::dlock::Entity as Dlock;
}

//! Application state modules
//!
//! The product slice lives in `product` (state shape, actions, reducer,
//! selectors). `store` owns a `ProductState`, runs the async operations and
//! feeds their results back through the reducer.

mod product;
mod store;

pub use product::{
    select_product, select_products, select_status, ProductAction, ProductState, Status, Thunk,
};
pub use store::ProductStore;

use crate::task::CallId;

/// Events the store returns when an async call settles.
/// These are transient: nothing here is kept in `ProductState`.
#[derive(Debug)]
pub enum StateEvent {
    /// The call's fulfilled action was applied
    Fulfilled { call: CallId, thunk: Thunk },

    /// The call's rejected action was applied
    Rejected {
        call: CallId,
        thunk: Thunk,
        error: String,
    },
}

//! Product slice: state shape, actions, reducer and selectors

use std::fmt;

use serde::Serialize;

use crate::api::Product;

/// Shared request status for every product operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Idle,
    Loading,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Loading => "loading",
            Status::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product slice state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductState {
    /// Last fetched or searched product list
    pub products: Vec<Product>,
    /// Currently selected product
    pub product: Option<Product>,
    /// Status of the most recently started or settled operation
    pub status: Status,
}

/// The async operations of the slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Thunk {
    FetchProduct,
    FetchProducts,
    SearchProducts,
}

impl Thunk {
    /// Action type prefix, e.g. `product/fetchProduct`
    pub fn type_prefix(&self) -> &'static str {
        match self {
            Thunk::FetchProduct => "product/fetchProduct",
            Thunk::FetchProducts => "product/fetchProducts",
            Thunk::SearchProducts => "product/searchProducts",
        }
    }

    pub fn pending(self) -> ProductAction {
        match self {
            Thunk::FetchProduct => ProductAction::FetchProductPending,
            Thunk::FetchProducts => ProductAction::FetchProductsPending,
            Thunk::SearchProducts => ProductAction::SearchProductsPending,
        }
    }

    pub fn rejected(self) -> ProductAction {
        match self {
            Thunk::FetchProduct => ProductAction::FetchProductRejected,
            Thunk::FetchProducts => ProductAction::FetchProductsRejected,
            Thunk::SearchProducts => ProductAction::SearchProductsRejected,
        }
    }
}

impl fmt::Display for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_prefix())
    }
}

/// Everything the reducer understands
#[derive(Debug, Clone, PartialEq)]
pub enum ProductAction {
    FetchProductPending,
    FetchProductFulfilled(Product),
    FetchProductRejected,
    FetchProductsPending,
    FetchProductsFulfilled(Vec<Product>),
    FetchProductsRejected,
    SearchProductsPending,
    SearchProductsFulfilled(Vec<Product>),
    SearchProductsRejected,
    RemoveCurrentProduct,
}

impl ProductAction {
    /// Action type string, e.g. `product/searchProducts/rejected`
    pub fn type_name(&self) -> &'static str {
        match self {
            ProductAction::FetchProductPending => "product/fetchProduct/pending",
            ProductAction::FetchProductFulfilled(_) => "product/fetchProduct/fulfilled",
            ProductAction::FetchProductRejected => "product/fetchProduct/rejected",
            ProductAction::FetchProductsPending => "product/fetchProducts/pending",
            ProductAction::FetchProductsFulfilled(_) => "product/fetchProducts/fulfilled",
            ProductAction::FetchProductsRejected => "product/fetchProducts/rejected",
            ProductAction::SearchProductsPending => "product/searchProducts/pending",
            ProductAction::SearchProductsFulfilled(_) => "product/searchProducts/fulfilled",
            ProductAction::SearchProductsRejected => "product/searchProducts/rejected",
            ProductAction::RemoveCurrentProduct => "product/removeCurrentProduct",
        }
    }
}

impl ProductState {
    /// Apply one action. This is the only place product state changes.
    pub fn apply(&mut self, action: ProductAction) {
        match action {
            ProductAction::FetchProductPending
            | ProductAction::FetchProductsPending
            | ProductAction::SearchProductsPending => {
                self.status = Status::Loading;
            }
            ProductAction::FetchProductFulfilled(product) => {
                self.status = Status::Idle;
                self.product = Some(product);
            }
            ProductAction::FetchProductsFulfilled(products)
            | ProductAction::SearchProductsFulfilled(products) => {
                self.status = Status::Idle;
                self.products = products;
            }
            ProductAction::FetchProductRejected
            | ProductAction::FetchProductsRejected
            | ProductAction::SearchProductsRejected => {
                self.status = Status::Failed;
            }
            ProductAction::RemoveCurrentProduct => {
                self.product = None;
            }
        }
    }
}

pub fn select_product(state: &ProductState) -> Option<&Product> {
    state.product.as_ref()
}

pub fn select_products(state: &ProductState) -> &[Product] {
    &state.products
}

pub fn select_status(state: &ProductState) -> Status {
    state.status
}

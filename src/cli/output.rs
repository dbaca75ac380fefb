//! Output formatting utilities for CLI

use serde::Serialize;

use crate::api::Product;
use crate::state::{select_product, select_products, select_status, ProductState};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Print a serializable value as JSON or use custom text formatter
pub fn print_formatted<T, F>(value: &T, format: OutputFormat, text_formatter: F)
where
    T: Serialize + ?Sized,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Text => println!("{}", text_formatter(value)),
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(value) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message (suppressed in quiet mode)
pub fn print_success(message: &str, quiet: bool) {
    if !quiet {
        println!("{}", message);
    }
}

/// Print an error message (never suppressed)
pub fn print_error(message: &str) {
    eprintln!("Error: {}", message);
}

/// One line per product: id and display name, or the raw JSON when neither is present
pub fn format_product(product: &Product) -> String {
    let id = product.id().map(|id| match id.as_str() {
        Some(s) => s.to_string(),
        None => id.to_string(),
    });
    match (id, product.display_name()) {
        (Some(id), Some(name)) => format!("{:>6}  {}", id, name),
        (Some(id), None) => format!("{:>6}", id),
        _ => product.0.to_string(),
    }
}

pub fn format_product_list(products: &[Product]) -> String {
    if products.is_empty() {
        return "No products.".to_string();
    }
    products
        .iter()
        .map(format_product)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Summary of the whole product state
pub fn format_state(state: &ProductState) -> String {
    let current = match select_product(state) {
        Some(product) => format_product(product).trim_start().to_string(),
        None => "<none>".to_string(),
    };
    format!(
        "Status:   {}\nProduct:  {}\nProducts: {}",
        select_status(state),
        current,
        select_products(state).len()
    )
}

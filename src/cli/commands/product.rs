//! Product commands: fetch, list, search and inspect the product store

use anyhow::Result;
use clap::Subcommand;

use crate::cli::output::{
    format_product, format_product_list, format_state, print_formatted, print_success,
    OutputFormat,
};
use crate::state::{select_product, select_products, ProductStore, StateEvent};
use crate::task::{CallId, CallPhase, Outcome};

#[derive(Subcommand, Debug)]
pub enum ProductCommands {
    /// Fetch a single product by id
    Get {
        /// Product id
        id: i64,

        /// Return once the request is dispatched (shell only)
        #[arg(long)]
        no_wait: bool,
    },

    /// Fetch all products
    List {
        /// Return once the request is dispatched (shell only)
        #[arg(long)]
        no_wait: bool,
    },

    /// Search products
    Search {
        /// Search text
        query: String,

        /// Return once the request is dispatched (shell only)
        #[arg(long)]
        no_wait: bool,
    },

    /// Clear the current product
    Remove,

    /// Show the current store state
    State,
}

pub async fn run(
    command: ProductCommands,
    store: &mut ProductStore,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    match command {
        ProductCommands::Get { id, no_wait } => {
            let call = store.fetch_product_by_id(id);
            if no_wait {
                return dispatched(call, format, quiet);
            }
            settle(store, call).await?;
            match select_product(store.state()) {
                Some(product) => print_formatted(product, format, format_product),
                None => print_formatted(&None::<()>, format, |_| "No product.".to_string()),
            }
        }
        ProductCommands::List { no_wait } => {
            let call = store.fetch_all_products();
            if no_wait {
                return dispatched(call, format, quiet);
            }
            settle(store, call).await?;
            print_formatted(select_products(store.state()), format, format_product_list);
        }
        ProductCommands::Search { query, no_wait } => {
            let call = store.search_products(query);
            if no_wait {
                return dispatched(call, format, quiet);
            }
            settle(store, call).await?;
            print_formatted(select_products(store.state()), format, format_product_list);
        }
        ProductCommands::Remove => {
            store.remove_current_product();
            print_success("Current product cleared.", quiet || format == OutputFormat::Json);
        }
        ProductCommands::State => {
            // Pick up calls dispatched with --no-wait that have settled since
            for event in store.poll() {
                log_event(&event);
            }
            print_formatted(store.state(), format, format_state);
        }
    }

    Ok(())
}

fn dispatched(call: CallId, format: OutputFormat, quiet: bool) -> Result<()> {
    print_success(
        &format!("Dispatched call {}; see `product state`.", call),
        quiet || format == OutputFormat::Json,
    );
    Ok(())
}

fn log_event(event: &StateEvent) {
    match event {
        StateEvent::Fulfilled { call, thunk } => {
            tracing::debug!(call = %call, "{} fulfilled", thunk);
        }
        StateEvent::Rejected { call, thunk, error } => {
            tracing::debug!(call = %call, "{} rejected: {}", thunk, error);
        }
    }
}

/// Wait for pending calls and fail if `call` was rejected
async fn settle(store: &mut ProductStore, call: CallId) -> Result<()> {
    tracing::debug!("Waiting for {} pending calls", store.pending_calls());

    let mut failure = None;
    for event in store.settle_all().await {
        log_event(&event);
        if let StateEvent::Rejected {
            call: settled,
            thunk,
            error,
        } = event
        {
            if settled == call {
                failure = Some(format!("{} failed: {}", thunk, error));
            }
        }
    }

    match store.call_phase(call) {
        CallPhase::Settled(Outcome::Rejected) => {
            anyhow::bail!(failure.unwrap_or_else(|| "Request failed".to_string()))
        }
        _ => Ok(()),
    }
}

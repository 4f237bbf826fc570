//! CSV ingestion of the customer, product and transaction tables using Polars

use std::path::Path;

use anyhow::{anyhow, Context};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::info;

use crate::records::{Customer, Product, RecordSet, Transaction};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Load the three input tables of one analysis run
pub fn load_records(
    customers_path: &Path,
    products_path: &Path,
    transactions_path: &Path,
) -> crate::Result<RecordSet> {
    let records = RecordSet {
        customers: load_customers(customers_path)?,
        products: load_products(products_path)?,
        transactions: load_transactions(transactions_path)?,
    };

    info!(
        customers = records.customers.len(),
        products = records.products.len(),
        transactions = records.transactions.len(),
        "loaded input tables"
    );

    Ok(records)
}

/// Columns: CustomerID, CustomerName, Region, SignupDate
pub fn load_customers(path: &Path) -> crate::Result<Vec<Customer>> {
    let df = read_csv(path)?;

    let ids = string_column(&df, "CustomerID")?;
    let names = string_column(&df, "CustomerName")?;
    let regions = string_column(&df, "Region")?;
    let signups = string_column(&df, "SignupDate")?;

    ids.into_iter()
        .zip(names)
        .zip(regions)
        .zip(signups)
        .map(|(((id, name), region), signup)| {
            let signup_date = parse_date(&signup)
                .with_context(|| format!("invalid SignupDate for customer {id}"))?;
            Ok(Customer {
                id,
                name,
                region,
                signup_date,
            })
        })
        .collect()
}

/// Columns: ProductID, ProductName, Category, Price
pub fn load_products(path: &Path) -> crate::Result<Vec<Product>> {
    let df = read_csv(path)?;

    let ids = string_column(&df, "ProductID")?;
    let names = string_column(&df, "ProductName")?;
    let categories = string_column(&df, "Category")?;
    let prices = float_column(&df, "Price")?;

    Ok(ids
        .into_iter()
        .zip(names)
        .zip(categories)
        .zip(prices)
        .map(|(((id, name), category), price)| Product {
            id,
            name,
            category,
            price,
        })
        .collect())
}

/// Columns: TransactionID, CustomerID, ProductID, TransactionDate, Quantity, TotalValue
pub fn load_transactions(path: &Path) -> crate::Result<Vec<Transaction>> {
    let df = read_csv(path)?;

    let ids = string_column(&df, "TransactionID")?;
    let customer_ids = string_column(&df, "CustomerID")?;
    let product_ids = string_column(&df, "ProductID")?;
    let dates = string_column(&df, "TransactionDate")?;
    let quantities = int_column(&df, "Quantity")?;
    let values = float_column(&df, "TotalValue")?;

    let mut transactions = Vec::with_capacity(ids.len());
    for (i, id) in ids.into_iter().enumerate() {
        let quantity = u32::try_from(quantities[i])
            .map_err(|_| anyhow!("negative or oversized Quantity {} in {id}", quantities[i]))?;
        let date = parse_datetime(&dates[i])
            .with_context(|| format!("invalid TransactionDate in {id}"))?;

        transactions.push(Transaction {
            id,
            customer_id: customer_ids[i].clone(),
            product_id: product_ids[i].clone(),
            date,
            quantity,
            total_value: values[i],
        });
    }

    Ok(transactions)
}

fn read_csv(path: &Path) -> crate::Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .with_context(|| format!("failed to open {}", path.display()))?
        .finish()
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(df)
}

fn string_column(df: &DataFrame, name: &str) -> crate::Result<Vec<String>> {
    let series = df
        .column(name)
        .with_context(|| format!("missing column {name}"))?
        .cast(&DataType::String)?;

    series
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value
                .map(|v| v.trim().to_string())
                .ok_or_else(|| anyhow!("null {name} at row {row}"))
        })
        .collect()
}

fn float_column(df: &DataFrame, name: &str) -> crate::Result<Vec<f64>> {
    let series = df
        .column(name)
        .with_context(|| format!("missing column {name}"))?
        .cast(&DataType::Float64)?;

    series
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| value.ok_or_else(|| anyhow!("null {name} at row {row}")))
        .collect()
}

fn int_column(df: &DataFrame, name: &str) -> crate::Result<Vec<i64>> {
    let series = df
        .column(name)
        .with_context(|| format!("missing column {name}"))?
        .cast(&DataType::Int64)?;

    series
        .i64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| value.ok_or_else(|| anyhow!("null {name} at row {row}")))
        .collect()
}

fn parse_date(value: &str) -> crate::Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(value, DATE_FORMAT)?)
}

/// Accepts `YYYY-MM-DD HH:MM:SS` or a bare date (midnight)
fn parse_datetime(value: &str) -> crate::Result<NaiveDateTime> {
    match NaiveDateTime::parse_from_str(value, DATETIME_FORMAT) {
        Ok(dt) => Ok(dt),
        Err(_) => Ok(parse_date(value)?.and_time(chrono::NaiveTime::MIN)),
    }
}

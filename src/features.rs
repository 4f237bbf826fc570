//! Per-customer behavioral profiles built from transaction records
//!
//! Column layout is resolved once over the whole record set ([`ProfileSchema`])
//! before any row is built, so every profile shares the same width and order:
//! five spend/quantity aggregates, one spend column per product category, and
//! one indicator column per customer region.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use ndarray::{Array2, ArrayView1};
use tracing::debug;

use crate::error::{AnalysisError, AnalysisResult};
use crate::records::{Customer, Product, RecordSet, Transaction};
use crate::segment::ClusterAssignment;

/// Aggregate columns that lead every profile row
pub const AGGREGATE_COLUMNS: [&str; 5] = [
    "TotalSpend",
    "AvgSpend",
    "TransactionCount",
    "TotalQuantity",
    "AvgQuantity",
];

const REGION_PREFIX: &str = "Region_";

/// Fixed, ordered column layout shared by all profiles of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSchema {
    /// Categories with at least one purchase, sorted
    pub categories: Vec<String>,
    /// Regions present in the customer table, sorted
    pub regions: Vec<String>,
}

impl ProfileSchema {
    /// Resolve the category and region columns over the full record set.
    ///
    /// Categories come from products referenced by at least one transaction;
    /// regions come from every customer, transacting or not.
    pub fn resolve(records: &RecordSet) -> AnalysisResult<Self> {
        let products = index_products(&records.products)?;

        let mut categories = BTreeSet::new();
        for tx in &records.transactions {
            let product = products
                .get(tx.product_id.as_str())
                .ok_or_else(|| AnalysisError::not_found("product", &tx.product_id))?;
            categories.insert(product.category.clone());
        }

        let regions: BTreeSet<String> = records
            .customers
            .iter()
            .map(|c| c.region.clone())
            .collect();

        Ok(Self {
            categories: categories.into_iter().collect(),
            regions: regions.into_iter().collect(),
        })
    }

    pub fn width(&self) -> usize {
        AGGREGATE_COLUMNS.len() + self.categories.len() + self.regions.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        AGGREGATE_COLUMNS
            .iter()
            .map(|name| name.to_string())
            .chain(self.categories.iter().cloned())
            .chain(self.regions.iter().map(|r| format!("{REGION_PREFIX}{r}")))
            .collect()
    }

    pub fn category_column(&self, category: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(category))
            .ok()
            .map(|i| AGGREGATE_COLUMNS.len() + i)
    }

    pub fn region_column(&self, region: &str) -> Option<usize> {
        self.regions
            .binary_search_by(|r| r.as_str().cmp(region))
            .ok()
            .map(|i| AGGREGATE_COLUMNS.len() + self.categories.len() + i)
    }
}

/// Profile matrix for every transacting customer, rows ordered by identity
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerProfiles {
    pub schema: ProfileSchema,
    /// Customer identity of each row
    pub customer_ids: Vec<String>,
    /// Unnormalized profile values (n_customers, schema width)
    pub values: Array2<f64>,
    /// Cluster label per row, once a segmentation has been attached
    pub clusters: Option<Vec<usize>>,
}

impl CustomerProfiles {
    pub fn len(&self) -> usize {
        self.customer_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customer_ids.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema.column_names()
    }

    pub fn index_of(&self, customer_id: &str) -> Option<usize> {
        self.customer_ids
            .binary_search_by(|id| id.as_str().cmp(customer_id))
            .ok()
    }

    pub fn row(&self, customer_id: &str) -> Option<ArrayView1<'_, f64>> {
        self.index_of(customer_id).map(|i| self.values.row(i))
    }

    /// Append the cluster label column produced by a segmentation run
    pub fn attach_clusters(&mut self, assignment: &ClusterAssignment) -> AnalysisResult<()> {
        let labels = self
            .customer_ids
            .iter()
            .map(|id| {
                assignment
                    .label_of(id)
                    .ok_or_else(|| AnalysisError::not_found("clustered customer", id))
            })
            .collect::<AnalysisResult<Vec<_>>>()?;

        self.clusters = Some(labels);
        Ok(())
    }
}

#[derive(Default)]
struct Accumulator {
    spend: f64,
    quantity: f64,
    count: usize,
    category_spend: Vec<f64>,
}

/// Build one profile per customer identity appearing in the transactions.
///
/// Customers without any transaction are not profiled: similarity and
/// segmentation only consider active customers. The output does not depend on
/// the order of the input rows.
pub fn build_profiles(records: &RecordSet) -> AnalysisResult<CustomerProfiles> {
    let schema = ProfileSchema::resolve(records)?;
    let products = index_products(&records.products)?;
    let customers = index_customers(&records.customers)?;
    check_unique_transactions(&records.transactions)?;

    // Canonical order keeps floating point sums identical across input orderings
    let mut transactions: Vec<&Transaction> = records.transactions.iter().collect();
    transactions.sort_by(|a, b| {
        (a.customer_id.as_str(), a.id.as_str(), a.product_id.as_str()).cmp(&(
            b.customer_id.as_str(),
            b.id.as_str(),
            b.product_id.as_str(),
        ))
    });

    let mut groups: BTreeMap<&str, Accumulator> = BTreeMap::new();
    for tx in transactions {
        if !customers.contains_key(tx.customer_id.as_str()) {
            return Err(AnalysisError::not_found("customer", &tx.customer_id));
        }
        let product = products
            .get(tx.product_id.as_str())
            .ok_or_else(|| AnalysisError::not_found("product", &tx.product_id))?;
        let category = schema
            .category_column(&product.category)
            .ok_or_else(|| AnalysisError::not_found("category", &product.category))?
            - AGGREGATE_COLUMNS.len();

        let acc = groups
            .entry(tx.customer_id.as_str())
            .or_insert_with(|| Accumulator {
                category_spend: vec![0.0; schema.categories.len()],
                ..Default::default()
            });
        acc.spend += tx.total_value;
        acc.quantity += f64::from(tx.quantity);
        acc.count += 1;
        acc.category_spend[category] += tx.total_value;
    }

    let width = schema.width();
    let mut values = Array2::zeros((groups.len(), width));
    let mut customer_ids = Vec::with_capacity(groups.len());

    for (row, (customer_id, acc)) in groups.into_iter().enumerate() {
        let count = acc.count as f64;
        let mut out = values.row_mut(row);
        out[0] = acc.spend;
        out[1] = acc.spend / count;
        out[2] = count;
        out[3] = acc.quantity;
        out[4] = acc.quantity / count;
        for (i, spend) in acc.category_spend.iter().enumerate() {
            out[AGGREGATE_COLUMNS.len() + i] = *spend;
        }

        // Presence was checked while grouping
        if let Some(customer) = customers.get(customer_id) {
            if let Some(col) = schema.region_column(&customer.region) {
                out[col] = 1.0;
            }
        }

        customer_ids.push(customer_id.to_string());
    }

    debug!(
        customers = customer_ids.len(),
        columns = width,
        categories = schema.categories.len(),
        regions = schema.regions.len(),
        "built customer profiles"
    );

    Ok(CustomerProfiles {
        schema,
        customer_ids,
        values,
        clusters: None,
    })
}

fn index_products(products: &[Product]) -> AnalysisResult<HashMap<&str, &Product>> {
    let mut index = HashMap::with_capacity(products.len());
    for product in products {
        if index.insert(product.id.as_str(), product).is_some() {
            return Err(AnalysisError::invalid(format!(
                "duplicate product id {}",
                product.id
            )));
        }
    }
    Ok(index)
}

fn index_customers(customers: &[Customer]) -> AnalysisResult<HashMap<&str, &Customer>> {
    let mut index = HashMap::with_capacity(customers.len());
    for customer in customers {
        if index.insert(customer.id.as_str(), customer).is_some() {
            return Err(AnalysisError::invalid(format!(
                "duplicate customer id {}",
                customer.id
            )));
        }
    }
    Ok(index)
}

fn check_unique_transactions(transactions: &[Transaction]) -> AnalysisResult<()> {
    let mut seen = HashSet::with_capacity(transactions.len());
    for tx in transactions {
        if !seen.insert(tx.id.as_str()) {
            return Err(AnalysisError::invalid(format!(
                "duplicate transaction id {}",
                tx.id
            )));
        }
    }
    Ok(())
}

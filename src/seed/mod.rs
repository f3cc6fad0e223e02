use chrono::Duration;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::audit::{AuditContext, AuditSink, Operator};
use crate::catalog;
use crate::db;
use crate::error::AppResult;
use crate::models::{
    AuditLogEntry, CreateCustomer, CreateProduct, Customer, NewRequest, OutOfStockRequest,
    Priority, Product, ProductSize, RequestStatus,
};
use crate::reconciliation;

static FIRST_NAMES: &[&str] = &[
    "Wang", "Li", "Zhang", "Liu", "Chen", "Yang", "Huang", "Zhao", "Wu", "Zhou",
    "Xu", "Sun", "Ma", "Zhu", "Hu", "Guo", "He", "Lin", "Luo", "Gao",
];

static SHOP_SUFFIXES: &[&str] = &[
    "Store", "Boutique", "Outlet", "Trading", "Fashion", "Garments", "Wholesale",
    "Retail", "Corner", "House",
];

static STREETS: &[&str] = &[
    "Canal St", "Market Rd", "Harbor Ave", "Station Rd", "Garden Ln", "River St",
    "Hill Rd", "Temple St", "Bridge Ave", "Mill Ln",
];

static CATEGORIES: &[&str] = &[
    "Shirts", "Trousers", "Dresses", "Jackets", "Knitwear", "Skirts", "Shoes",
    "Accessories",
];

static ADJECTIVES: &[&str] = &[
    "Classic", "Slim", "Relaxed", "Linen", "Cotton", "Wool", "Denim", "Silk",
    "Pleated", "Cropped", "Oversized", "Tailored", "Striped", "Plain", "Printed",
];

static NOUNS: &[&str] = &[
    "Shirt", "Blouse", "Trousers", "Chinos", "Dress", "Blazer", "Cardigan",
    "Sweater", "Skirt", "Jacket", "Coat", "Loafers", "Scarf", "Vest", "Polo",
];

static COLORS: &[&str] = &[
    "Black", "White", "Navy", "Grey", "Beige", "Red", "Olive", "Burgundy",
    "Sky Blue", "Camel",
];

static SIZE_RUNS: &[&[&str]] = &[
    &["XS", "S", "M", "L", "XL"],
    &["S", "M", "L"],
    &["36", "38", "40", "42", "44"],
    &["One Size"],
];

static NOTES: &[&str] = &[
    "Customer will pick up in store",
    "Call before delivery",
    "Gift, wrap separately",
    "Urgent for event",
    "Accepts a similar color",
];

/// How much demo data to generate.
#[derive(Debug, Clone, Copy)]
pub struct SeedCounts {
    pub customers: usize,
    pub products: usize,
    pub requests: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedSummary {
    pub customers: usize,
    pub products: usize,
    pub sizes: usize,
    pub requests: usize,
    pub deliveries: usize,
    pub audit_entries: usize,
}

fn random_customers(
    rng: &mut impl Rng,
    count: usize,
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> AppResult<Vec<Customer>> {
    let mut customers = Vec::with_capacity(count);
    for serial in 0..count {
        let name = format!(
            "{} {} #{:03}",
            FIRST_NAMES.choose(rng).unwrap_or(&"Wang"),
            SHOP_SUFFIXES.choose(rng).unwrap_or(&"Store"),
            serial
        );
        let address = format!(
            "{} {}",
            rng.gen_range(1..=250),
            STREETS.choose(rng).unwrap_or(&"Market Rd")
        );
        let phone = rng
            .gen_bool(0.8)
            .then(|| format!("555-{:04}", rng.gen_range(0..10_000)));
        let input = CreateCustomer { name, address, phone };
        customers.push(catalog::create_customer(&input, ctx, sink)?);
    }
    Ok(customers)
}

/// Products paired with the size labels to create for them.
fn random_products(
    rng: &mut impl Rng,
    count: usize,
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> AppResult<Vec<(Product, Vec<String>)>> {
    let mut products = Vec::with_capacity(count);
    for serial in 0..count {
        let name = format!(
            "{} {} #{:04}",
            ADJECTIVES.choose(rng).unwrap_or(&"Classic"),
            NOUNS.choose(rng).unwrap_or(&"Shirt"),
            serial
        );
        let description = rng
            .gen_bool(0.6)
            .then(|| format!("Seasonal line, serial {}", serial));
        let color_count = rng.gen_range(1..=3);
        let colors: Vec<String> = COLORS
            .choose_multiple(rng, color_count)
            .map(|c| c.to_string())
            .collect();
        let sizes: Vec<String> = SIZE_RUNS
            .choose(rng)
            .map(|run| run.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();
        let input = CreateProduct {
            name,
            description,
            category: CATEGORIES.choose(rng).unwrap_or(&"Shirts").to_string(),
            colors,
            sizes: sizes.clone(),
        };
        products.push((catalog::create_product(&input, ctx, sink)?, sizes));
    }
    Ok(products)
}

/// Requests spread over the last 60 days. Some get partial or full
/// deliveries and some move along the status flow.
fn random_requests(
    rng: &mut impl Rng,
    count: usize,
    customers: &[Customer],
    sizes: &[ProductSize],
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> (Vec<OutOfStockRequest>, usize) {
    let mut requests = Vec::with_capacity(count);
    let mut deliveries = 0;

    for _ in 0..count {
        let size = sizes.choose(rng);
        let new = NewRequest {
            customer_id: customers.choose(rng).map(|c| c.id),
            product_id: size.map(|s| s.product_id),
            product_size_id: size.map(|s| s.id),
            quantity: rng.gen_range(1..=60),
            priority: *[Priority::Low, Priority::Medium, Priority::High]
                .choose(rng)
                .unwrap_or(&Priority::Medium),
            request_date: Some(ctx.now - Duration::days(rng.gen_range(0..60))),
            notes: rng.gen_bool(0.3).then(|| {
                NOTES.choose(rng).unwrap_or(&"Call before delivery").to_string()
            }),
        };
        let mut request = match reconciliation::create_request(&new, ctx, sink) {
            Ok(request) => request,
            Err(rejection) => {
                warn!(%rejection, "Skipped seeded request");
                continue;
            }
        };

        if rng.gen_bool(0.5) {
            let target = if rng.gen_bool(0.5) {
                RequestStatus::Confirmed
            } else {
                RequestStatus::InProduction
            };
            if let Err(rejection) =
                reconciliation::change_status(&mut request, target, false, ctx, sink)
            {
                warn!(id = %request.id, %rejection, "Skipped seeded status change");
            }
        }

        if rng.gen_bool(0.4) {
            let quantity = rng.gen_range(1..=request.remaining_quantity());
            let notes = format!("Box {}", rng.gen_range(1..=20));
            if reconciliation::apply_delivery(&mut request, quantity, Some(&notes), ctx, sink).is_ok()
            {
                deliveries += 1;
            }
        } else if rng.gen_bool(0.05) {
            if let Err(rejection) = reconciliation::change_status(
                &mut request,
                RequestStatus::Cancelled,
                false,
                ctx,
                sink,
            ) {
                warn!(id = %request.id, %rejection, "Skipped seeded cancellation");
            }
        }

        requests.push(request);
    }

    (requests, deliveries)
}

/// Generates demo customers, products, sizes and requests, audited like
/// operator edits, and writes them in one transaction.
pub async fn seed_demo_data(
    pool: &PgPool,
    operator: &Operator,
    counts: SeedCounts,
) -> AppResult<SeedSummary> {
    info!(
        customers = counts.customers,
        products = counts.products,
        requests = counts.requests,
        "Seeding demo data..."
    );

    // StdRng is Send, unlike ThreadRng, so it can live across await points.
    let mut rng = StdRng::from_entropy();
    let ctx = AuditContext::new(operator, chrono::Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();

    let customers = random_customers(&mut rng, counts.customers, &ctx, &mut log)?;
    let products = random_products(&mut rng, counts.products, &ctx, &mut log)?;

    let mut tx = pool.begin().await?;
    for customer in &customers {
        db::customers::insert_customer(&mut tx, customer).await?;
    }
    let mut sizes: Vec<ProductSize> = Vec::new();
    for (product, labels) in &products {
        db::products::insert_product(&mut tx, product).await?;
        sizes.extend(db::products::insert_sizes(&mut tx, product.id, labels).await?);
    }
    info!(customers = customers.len(), products = products.len(), sizes = sizes.len(), "  Seeded catalog");

    let (requests, deliveries) =
        random_requests(&mut rng, counts.requests, &customers, &sizes, &ctx, &mut log);
    for request in &requests {
        db::requests::insert_request(&mut tx, request).await?;
    }
    db::audit::insert_entries(&mut tx, &log).await?;
    tx.commit().await?;

    let summary = SeedSummary {
        customers: customers.len(),
        products: products.len(),
        sizes: sizes.len(),
        requests: requests.len(),
        deliveries,
        audit_entries: log.len(),
    };
    info!(?summary, "Seeding complete");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::{EntityType, OperationType};
    use crate::reconciliation::tests::operator;

    fn sizes_for(products: &[(Product, Vec<String>)]) -> Vec<ProductSize> {
        products
            .iter()
            .flat_map(|(product, labels)| {
                labels.iter().map(|label| ProductSize {
                    id: Uuid::new_v4(),
                    product_id: product.id,
                    label: label.clone(),
                })
            })
            .collect()
    }

    #[test]
    fn catalog_generation_audits_every_record() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut rng = StdRng::seed_from_u64(7);
        let mut log: Vec<AuditLogEntry> = Vec::new();

        let customers = random_customers(&mut rng, 12, &ctx, &mut log).unwrap();
        let products = random_products(&mut rng, 5, &ctx, &mut log).unwrap();

        assert_eq!(customers.len(), 12);
        assert_eq!(products.len(), 5);
        assert_eq!(log.len(), 17);
        assert!(log.iter().all(|e| e.operation_type == OperationType::Create));
        assert!(products.iter().all(|(p, sizes)| !p.colors.is_empty() && !sizes.is_empty()));
    }

    #[test]
    fn generated_requests_respect_quantity_bounds() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut rng = StdRng::seed_from_u64(42);
        let mut log: Vec<AuditLogEntry> = Vec::new();

        let customers = random_customers(&mut rng, 4, &ctx, &mut log).unwrap();
        let products = random_products(&mut rng, 3, &ctx, &mut log).unwrap();
        let sizes = sizes_for(&products);
        log.clear();

        let (requests, deliveries) =
            random_requests(&mut rng, 200, &customers, &sizes, &ctx, &mut log);

        assert_eq!(requests.len(), 200);
        assert!(requests.iter().all(|r| r.quantity > 0
            && r.delivery_quantity >= 0
            && r.delivery_quantity <= r.quantity));
        let delivered = requests.iter().filter(|r| r.delivery_quantity > 0).count();
        assert_eq!(delivered, deliveries);

        let returns = log
            .iter()
            .filter(|e| e.operation_type == OperationType::ReturnProcess)
            .count();
        assert_eq!(returns, deliveries);
        assert!(log.iter().all(|e| e.entity_type == EntityType::OutOfStockRequest));
        assert!(requests.iter().all(|r| r.customer_id.is_some() && r.product_size_id.is_some()));
    }
}

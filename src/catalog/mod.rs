//! Audited edits of customer and product records.

use uuid::Uuid;

use crate::audit::{AuditContext, AuditSink, FieldDiff};
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateCustomer, CreateProduct, Customer, EntitySnapshot, EntityType, FieldValue,
    OperationDetails, Product, UpdateCustomer, UpdateProduct,
};

pub fn create_customer(
    input: &CreateCustomer,
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> AppResult<Customer> {
    let name = required_name(&input.name)?;
    let customer = Customer {
        id: Uuid::new_v4(),
        name,
        address: input.address.trim().to_string(),
        phone: input.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()).map(str::to_string),
        created_at: ctx.now,
        updated_at: ctx.now,
    };
    sink.record(ctx.entry(
        EntityType::Customer,
        customer.id,
        customer.description(),
        OperationDetails::Create {
            snapshot: EntitySnapshot::Customer(customer.clone()),
        },
    ));
    Ok(customer)
}

/// Returns whether anything changed; unchanged edits record nothing.
pub fn update_customer(
    customer: &mut Customer,
    input: &UpdateCustomer,
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> AppResult<bool> {
    let name = input.name.as_deref().map(required_name).transpose()?;
    let address = input.address.as_ref().map(|a| a.trim().to_string());

    let mut diff = FieldDiff::new();
    diff.compare("name", &customer.name, name.as_ref(), |v| FieldValue::Text(Some(v)));
    diff.compare("address", &customer.address, address.as_ref(), |v| {
        FieldValue::Text(Some(v))
    });
    diff.compare("phone", &customer.phone, input.phone.as_ref(), FieldValue::Text);
    if diff.is_empty() {
        return Ok(false);
    }

    if let Some(name) = name {
        customer.name = name;
    }
    if let Some(address) = address {
        customer.address = address;
    }
    if let Some(phone) = &input.phone {
        customer.phone = phone.clone();
    }
    customer.updated_at = ctx.now;

    sink.record(ctx.entry(
        EntityType::Customer,
        customer.id,
        customer.description(),
        diff.into_details(),
    ));
    Ok(true)
}

pub fn delete_customer(customer: &Customer, ctx: &AuditContext<'_>, sink: &mut impl AuditSink) {
    sink.record(ctx.entry(
        EntityType::Customer,
        customer.id,
        customer.description(),
        OperationDetails::Delete {
            snapshot: EntitySnapshot::Customer(customer.clone()),
        },
    ));
}

pub fn create_product(
    input: &CreateProduct,
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> AppResult<Product> {
    let name = required_name(&input.name)?;
    let product = Product {
        id: Uuid::new_v4(),
        name,
        description: input.description.clone(),
        category: input.category.trim().to_string(),
        colors: clean_labels(&input.colors),
        created_at: ctx.now,
        updated_at: ctx.now,
    };
    sink.record(ctx.entry(
        EntityType::Product,
        product.id,
        product.description_line(),
        OperationDetails::Create {
            snapshot: EntitySnapshot::Product(product.clone()),
        },
    ));
    Ok(product)
}

pub fn update_product(
    product: &mut Product,
    input: &UpdateProduct,
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> AppResult<bool> {
    let name = input.name.as_deref().map(required_name).transpose()?;
    let category = input.category.as_ref().map(|c| c.trim().to_string());
    let colors = input.colors.as_deref().map(clean_labels);

    let mut diff = FieldDiff::new();
    diff.compare("name", &product.name, name.as_ref(), |v| FieldValue::Text(Some(v)));
    diff.compare(
        "description",
        &product.description,
        input.description.as_ref(),
        FieldValue::Text,
    );
    diff.compare("category", &product.category, category.as_ref(), |v| {
        FieldValue::Text(Some(v))
    });
    diff.compare("colors", &product.colors, colors.as_ref(), |v| {
        FieldValue::Text(Some(v.join(", ")))
    });
    if diff.is_empty() {
        return Ok(false);
    }

    if let Some(name) = name {
        product.name = name;
    }
    if let Some(description) = &input.description {
        product.description = description.clone();
    }
    if let Some(category) = category {
        product.category = category;
    }
    if let Some(colors) = colors {
        product.colors = colors;
    }
    product.updated_at = ctx.now;

    sink.record(ctx.entry(
        EntityType::Product,
        product.id,
        product.description_line(),
        diff.into_details(),
    ));
    Ok(true)
}

pub fn delete_product(product: &Product, ctx: &AuditContext<'_>, sink: &mut impl AuditSink) {
    sink.record(ctx.entry(
        EntityType::Product,
        product.id,
        product.description_line(),
        OperationDetails::Delete {
            snapshot: EntitySnapshot::Product(product.clone()),
        },
    ));
}

/// Trimmed, non-empty, de-duplicated labels in their original order.
pub fn clean_labels(labels: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        let label = label.trim();
        if !label.is_empty() && !out.iter().any(|l| l == label) {
            out.push(label.to_string());
        }
    }
    out
}

fn required_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::audit::Operator;
    use crate::models::{AuditLogEntry, OperationType};

    fn operator() -> Operator {
        Operator {
            user_id: "u-3".to_string(),
            name: "Ana".to_string(),
        }
    }

    #[test]
    fn customer_needs_a_name() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let input = CreateCustomer {
            name: "   ".to_string(),
            address: String::new(),
            phone: None,
        };
        assert!(matches!(
            create_customer(&input, &ctx, &mut log),
            Err(AppError::BadRequest(_))
        ));
        assert!(log.is_empty());
    }

    #[test]
    fn customer_update_records_only_real_changes() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let input = CreateCustomer {
            name: "Wang Store".to_string(),
            address: "5 Canal St".to_string(),
            phone: Some("555-0101".to_string()),
        };
        let mut customer = create_customer(&input, &ctx, &mut log).unwrap();

        let same = UpdateCustomer {
            name: Some(" Wang Store ".to_string()),
            ..Default::default()
        };
        assert!(!update_customer(&mut customer, &same, &ctx, &mut log).unwrap());
        assert_eq!(log.len(), 1);

        let edit = UpdateCustomer {
            address: Some("9 Canal St".to_string()),
            phone: Some(None),
            ..Default::default()
        };
        assert!(update_customer(&mut customer, &edit, &ctx, &mut log).unwrap());
        assert_eq!(customer.phone, None);
        assert_eq!(log.len(), 2);
        match log[1].details() {
            OperationDetails::Update { changed_fields, before, .. } => {
                assert_eq!(changed_fields, &vec!["address".to_string(), "phone".to_string()]);
                assert_eq!(before["phone"], FieldValue::Text(Some("555-0101".to_string())));
            }
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[test]
    fn product_colors_are_cleaned_and_diffed() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let input = CreateProduct {
            name: "Polo".to_string(),
            description: None,
            category: "Shirts".to_string(),
            colors: vec!["Red".into(), " Red ".into(), "".into(), "Navy".into()],
            sizes: vec![],
        };
        let mut product = create_product(&input, &ctx, &mut log).unwrap();
        assert_eq!(product.colors, vec!["Red", "Navy"]);

        let edit = UpdateProduct {
            colors: Some(vec!["Navy".into(), "Red".into()]),
            ..Default::default()
        };
        assert!(update_product(&mut product, &edit, &ctx, &mut log).unwrap());
        assert_eq!(log[1].operation_type, OperationType::Update);
    }

    #[test]
    fn deletes_carry_snapshots() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let input = CreateCustomer {
            name: "Li".to_string(),
            address: String::new(),
            phone: None,
        };
        let customer = create_customer(&input, &ctx, &mut log).unwrap();
        delete_customer(&customer, &ctx, &mut log);
        assert_eq!(log[1].operation_type, OperationType::Delete);
        assert_eq!(log[1].entity_type, EntityType::Customer);
        assert_eq!(
            log[1].details(),
            &OperationDetails::Delete {
                snapshot: EntitySnapshot::Customer(customer)
            }
        );
    }
}

use crate::models::RequestRecord;

const HEADER: [&str; 16] = [
    "id",
    "request_date",
    "customer",
    "address",
    "product",
    "size",
    "quantity",
    "delivered",
    "remaining",
    "status",
    "priority",
    "progress",
    "notes",
    "delivery_date",
    "delivery_notes",
    "created_by",
];

/// Renders request records as a spreadsheet-compatible CSV document.
pub fn requests_to_csv<'a, I>(records: I) -> anyhow::Result<String>
where
    I: IntoIterator<Item = &'a RequestRecord>,
{
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(HEADER)?;

    for record in records {
        let r = &record.request;
        wtr.write_record([
            r.id.to_string(),
            r.request_date.to_rfc3339(),
            record.customer_name.clone().unwrap_or_default(),
            record.customer_address.clone().unwrap_or_default(),
            record.product_name.clone().unwrap_or_default(),
            record.size_label.clone().unwrap_or_default(),
            r.quantity.to_string(),
            r.delivery_quantity.to_string(),
            r.remaining_quantity().to_string(),
            r.status.to_string(),
            r.priority.to_string(),
            r.delivery_progress().as_str().to_string(),
            r.notes.clone().unwrap_or_default(),
            r.delivery_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
            r.delivery_notes.clone().unwrap_or_default(),
            r.created_by.clone(),
        ])?;
    }

    let data = wtr.into_inner()?;
    Ok(String::from_utf8(data)?)
}

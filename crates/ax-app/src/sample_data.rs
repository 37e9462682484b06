//! Generate a sample statistics dataset as Arrow IPC files

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};

use ax_core::Dimension;
use ax_data::{Granularity, SourceLayout, SourceLocator};

const CONTRACTORS: &[&str] = &[
    "ACME CORP", "Globex", "Initech", "O'Brien & Sons", "Umbrella Builders",
    "Stark Engineering", "Wayne Logistics", "Tyrell Systems", "Cyberdyne Services",
    "Soylent Supplies", "Wonka Facilities", "Hooli Networks",
];
const ORGANIZATIONS: &[&str] = &[
    "City Works", "Port Authority", "Department of Health", "Transit Agency",
    "Water Board", "Education Office", "Parks Department",
];
const CATEGORIES: &[&str] = &["Construction", "Consulting", "Supplies", "Maintenance", "IT Services"];
const AREAS: &[&str] = &[
    "Metro", "Harbor", "North District", "South District", "East Valley", "West Valley",
    "Riverside", "Hillcrest", "Old Town", "Airport Zone", "Industrial Park", "Lakeside",
];
const WORKS: &[&str] = &["Repair", "Supply", "Upgrade", "Inspection", "Installation", "Cleaning"];

struct Contract {
    date: NaiveDate,
    contractor: &'static str,
    organization: &'static str,
    category: &'static str,
    area: &'static str,
    amount: f64,
    title: String,
    notice: String,
    number: String,
}

impl Contract {
    fn value(&self, dimension: Dimension) -> &'static str {
        match dimension {
            Dimension::Contractor => self.contractor,
            Dimension::Area => self.area,
            Dimension::Organization => self.organization,
            Dimension::Category => self.category,
        }
    }
}

/// Write facts and per-dimension aggregates for every time slice under `out`
pub fn create_sample_dataset(out: &Path, contracts: usize, seed: u32) -> Result<()> {
    let facts = generate_contracts(contracts, seed);
    let layout = |granularity| SourceLayout::new(SourceLocator::Path(out.to_path_buf()), granularity);

    println!("Generating {} contracts...", facts.len());
    write_slice(&layout(Granularity::AllTime), &facts.iter().collect::<Vec<_>>())?;

    let mut years: BTreeMap<i32, Vec<&Contract>> = BTreeMap::new();
    let mut quarters: BTreeMap<(i32, u8), Vec<&Contract>> = BTreeMap::new();
    for contract in &facts {
        let year = contract.date.year();
        let quarter = (contract.date.month0() / 3 + 1) as u8;
        years.entry(year).or_default().push(contract);
        quarters.entry((year, quarter)).or_default().push(contract);
    }

    for (year, slice) in &years {
        write_slice(&layout(Granularity::Year { year: *year }), slice)?;
    }
    for ((year, quarter), slice) in &quarters {
        write_slice(&layout(Granularity::Quarter { year: *year, quarter: *quarter }), slice)?;
    }

    println!(
        "Sample dataset created in {} ({} years, {} quarters)",
        out.display(),
        years.len(),
        quarters.len()
    );
    Ok(())
}

fn generate_contracts(count: usize, seed: u32) -> Vec<Contract> {
    let mut rng = seed;
    let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or(NaiveDate::MIN);

    (0..count)
        .map(|i| {
            let contractor = pick(CONTRACTORS, &mut rng);
            let work = pick(WORKS, &mut rng);
            let area = pick(AREAS, &mut rng);
            // Heavy-tailed amounts so a few contractors dominate
            let scale = if contractor == "ACME CORP" { 4.0 } else { 1.0 };
            let amount = (1_000.0 + random_float(&mut rng).powi(3) * 250_000.0 * scale).round();

            Contract {
                date: start + chrono::Duration::days((random_int(&mut rng) % (3 * 365)) as i64),
                contractor,
                organization: pick(ORGANIZATIONS, &mut rng),
                category: pick(CATEGORIES, &mut rng),
                area,
                amount,
                title: format!("{} works in {}", work, area),
                notice: format!("Notice of award: {} {}", work.to_lowercase(), area),
                number: format!("C-{:05}", i + 1),
            }
        })
        .collect()
}

fn write_slice(layout: &SourceLayout, contracts: &[&Contract]) -> Result<()> {
    write_batch(&layout.facts(), facts_batch(contracts)?)?;
    for dimension in Dimension::ALL {
        write_batch(&layout.aggregate(dimension), aggregate_batch(dimension, contracts)?)?;
    }
    Ok(())
}

fn facts_batch(contracts: &[&Contract]) -> Result<RecordBatch> {
    let text = |f: fn(&Contract) -> &str| -> ArrayRef {
        Arc::new(StringArray::from(contracts.iter().map(|c| f(c)).collect::<Vec<_>>()))
    };

    let schema = Schema::new(vec![
        Field::new("award_date", DataType::Date32, false),
        Field::new("contractor_name", DataType::Utf8, false),
        Field::new("organization_name", DataType::Utf8, false),
        Field::new("business_category", DataType::Utf8, false),
        Field::new("area_of_delivery", DataType::Utf8, false),
        Field::new("contract_amount", DataType::Float64, false),
        Field::new("award_title", DataType::Utf8, false),
        Field::new("notice_title", DataType::Utf8, false),
        Field::new("contract_no", DataType::Utf8, false),
    ]);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Date32Array::from(contracts.iter().map(|c| epoch_days(c.date)).collect::<Vec<_>>())),
        text(|c| c.contractor),
        text(|c| c.organization),
        text(|c| c.category),
        text(|c| c.area),
        Arc::new(Float64Array::from(contracts.iter().map(|c| c.amount).collect::<Vec<_>>())),
        text(|c| c.title.as_str()),
        text(|c| c.notice.as_str()),
        text(|c| c.number.as_str()),
    ];

    Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
}

#[derive(Default)]
struct Totals {
    count: i64,
    total: f64,
    first: Option<NaiveDate>,
    last: Option<NaiveDate>,
}

fn aggregate_batch(dimension: Dimension, contracts: &[&Contract]) -> Result<RecordBatch> {
    let mut groups: BTreeMap<&str, Totals> = BTreeMap::new();
    for contract in contracts {
        let totals = groups.entry(contract.value(dimension)).or_default();
        totals.count += 1;
        totals.total += contract.amount;
        totals.first = Some(totals.first.map_or(contract.date, |d| d.min(contract.date)));
        totals.last = Some(totals.last.map_or(contract.date, |d| d.max(contract.date)));
    }

    let schema = Schema::new(vec![
        Field::new(dimension.column(), DataType::Utf8, false),
        Field::new("contract_count", DataType::Int64, false),
        Field::new("total_value", DataType::Float64, false),
        Field::new("average_value", DataType::Float64, false),
        Field::new("first_date", DataType::Date32, true),
        Field::new("last_date", DataType::Date32, true),
    ]);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(groups.keys().copied().collect::<Vec<_>>())),
        Arc::new(Int64Array::from(groups.values().map(|t| t.count).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(groups.values().map(|t| t.total).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(
            groups.values().map(|t| t.total / t.count.max(1) as f64).collect::<Vec<_>>(),
        )),
        Arc::new(Date32Array::from(groups.values().map(|t| t.first.map(epoch_days)).collect::<Vec<_>>())),
        Arc::new(Date32Array::from(groups.values().map(|t| t.last.map(epoch_days)).collect::<Vec<_>>())),
    ];

    Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
}

fn write_batch(locator: &SourceLocator, batch: RecordBatch) -> Result<()> {
    let SourceLocator::Path(path) = locator else {
        anyhow::bail!("sample data can only be written to a local directory, not {}", locator);
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = FileWriter::try_new(file, &batch.schema())?;
    writer.write(&batch)?;
    writer.finish()?;
    Ok(())
}

fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - 719_163
}

fn pick<T: Copy>(items: &[T], seed: &mut u32) -> T {
    items[random_int(seed) as usize % items.len()]
}

fn random_float(seed: &mut u32) -> f64 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    (*seed as f64) / (u32::MAX as f64)
}

fn random_int(seed: &mut u32) -> u32 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    *seed
}

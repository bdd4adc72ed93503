use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use chrono::NaiveDate;
use rand::{rngs::StdRng, Rng, SeedableRng};

use ispdesk::flows::customers::filter_customers;
use ispdesk::model::{Customer, CustomerForm};
use ispdesk::validate::validate_customer;

const SYLLABLES: &[&str] = &["wa", "nji", "ru", "ot", "ie", "no", "ka", "mau", "ach", "ie", "ng", "net"];

fn gen_customers(n: usize, seed: u64) -> Vec<Customer> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let name: String = (0..rng.gen_range(2..6)).map(|_| SYLLABLES[rng.gen_range(0..SYLLABLES.len())]).collect();
            Customer { db_id: Some(i as i64), name, ..Customer::default() }
        })
        .collect()
}

fn form() -> CustomerForm {
    CustomerForm {
        name: "Acme Networks".into(),
        phone: "0712345678".into(),
        email: "ops@acme.co.ke".into(),
        balance: "120.50".into(),
        router_ip_address: "192.168.88.1".into(),
        bandwidth: "20".into(),
        subscription_amount: "2500".into(),
        start_date: "2024-01-01".into(),
        last_payment_date: "2024-05-30".into(),
    }
}

fn bench_validate(c: &mut Criterion) {
    let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap_or_default();
    let good = form();
    let bad = CustomerForm { phone: "12345".into(), router_ip_address: "999.1.1.1".into(), ..form() };
    let mut group = c.benchmark_group("validate_customer");
    group.bench_function("valid", |b| b.iter(|| criterion::black_box(validate_customer(&good, today))));
    group.bench_function("invalid", |b| b.iter(|| criterion::black_box(validate_customer(&bad, today))));
    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_customers");
    for &n in &[1_000usize, 50_000usize] {
        let customers = gen_customers(n, 0xC0FF_EE);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("query", n.to_string()), &customers, |b, cs| {
            b.iter(|| criterion::black_box(filter_customers(cs, "Mau").len()));
        });
        group.bench_with_input(BenchmarkId::new("empty_query", n.to_string()), &customers, |b, cs| {
            b.iter(|| criterion::black_box(filter_customers(cs, "").len()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_validate, bench_filter);
criterion_main!(benches);

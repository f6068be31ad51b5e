use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use company_resolution::index::CandidateIndex;
use company_resolution::matcher::{MatcherConfig, SimilarityMatcher};
use company_resolution::normalize::{normalize_domain, normalize_name};
use company_resolution::selector::PrimarySelector;
use company_resolution::{CanonicalCompany, Classification};

const STEMS: &[&str] = &[
    "acme", "globex", "initech", "umbrella", "stark", "wayne", "tyrell", "cyberdyne", "soylent",
    "hooli", "vandelay", "wonka", "oscorp", "aperture", "massive", "dynamic",
];

const TAILS: &[&str] = &[
    "S.A. de C.V.", "Inc", "Labs", "México", "Group", "Holdings", "", "Corp",
];

/// Deterministic population where roughly one record in four duplicates an
/// earlier one by domain, by suffix variant or by a one-letter typo.
fn population(size: usize) -> Vec<CanonicalCompany> {
    (0..size)
        .map(|i| {
            let stem = STEMS[i % STEMS.len()];
            let family = i / 4;
            let tail = TAILS[i % TAILS.len()];
            let name = match i % 4 {
                0 => format!("{stem} {family} {tail}"),
                1 => format!("{stem} {family}"),
                2 => format!("{stem}x {family}"),
                _ => format!("{stem} unrelated {i}"),
            };
            let mut company = CanonicalCompany::new(name.trim(), Classification::Outbound);
            if i % 4 != 3 {
                if let Some(domain) = normalize_domain(&format!("https://www.{stem}{family}.com")) {
                    company.set_domain(domain);
                }
            }
            company
        })
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize/name", |b| {
        b.iter(|| normalize_name(black_box("Laboratorios Alfa S.A. de C.V. México")));
    });
    c.bench_function("normalize/domain", |b| {
        b.iter(|| normalize_domain(black_box("HTTPS://www.Acme.com:443/contact?ref=1")));
    });
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index/build");
    for size in [1_000usize, 10_000] {
        let companies = population(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &companies, |b, companies| {
            b.iter(|| CandidateIndex::build(black_box(companies)));
        });
    }
    group.finish();
}

fn bench_clusters(c: &mut Criterion) {
    let matcher = SimilarityMatcher::new(MatcherConfig::default());
    let mut group = c.benchmark_group("matcher/find_clusters");
    group.sample_size(20);
    for size in [500usize, 2_000] {
        let companies = population(size);
        let index = CandidateIndex::build(&companies);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &index, |b, index| {
            b.iter(|| matcher.find_clusters(black_box(index), usize::MAX));
        });
    }
    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let companies = population(2_000);
    let index = CandidateIndex::build(&companies);
    let clusters = SimilarityMatcher::new(MatcherConfig::default()).domain_clusters(&index);
    let selector = PrimarySelector::default();
    let by_id: std::collections::HashMap<_, _> = companies.iter().map(|c| (c.id, c)).collect();
    let members: Vec<Vec<&CanonicalCompany>> = clusters
        .iter()
        .map(|cluster| cluster.members.iter().filter_map(|id| by_id.get(id).copied()).collect())
        .collect();

    c.bench_function("selector/select_all_domain_clusters", |b| {
        b.iter(|| {
            for cluster in &members {
                black_box(selector.select(cluster));
            }
        });
    });
}

criterion_group!(matching, bench_normalize, bench_index, bench_clusters, bench_select);
criterion_main!(matching);

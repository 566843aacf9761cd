use criterion::{criterion_group, criterion_main, Bencher, Criterion};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tick_regex::Pattern;

fn haystack(len: usize) -> Vec<u8> {
    let mut rng = SmallRng::from_seed([0; 16]);

    let mut text = Vec::with_capacity(len);
    while text.len() < len {
        // Mostly noise, with a needle planted every twenty bytes or so.
        if rng.gen_range(0, 20) == 0 {
            text.extend_from_slice(b"efgh");
        } else {
            text.push(b'a' + rng.gen_range(0, 26) as u8);
        }
    }
    text.truncate(len);
    text
}

fn do_find_all(b: &mut Bencher) {
    let text = haystack(16 * 1024);
    let pattern = Pattern::new("abcd|efgh|ijkl").unwrap();

    b.iter(|| pattern.find_all(&text));
}

fn do_regex_find_all(b: &mut Bencher) {
    let text = haystack(16 * 1024);
    let re = regex::bytes::Regex::new("abcd|efgh|ijkl").unwrap();

    b.iter(|| re.find_iter(&text).count());
}

fn bench_find_all(c: &mut Criterion) {
    c.bench_function("find_all", do_find_all);
    c.bench_function("regex_find_all", do_regex_find_all);
}

criterion_group!(benches, bench_find_all);
criterion_main!(benches);

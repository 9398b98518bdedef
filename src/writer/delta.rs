//! In-place delta encoding and flush-time cleanup passes.

/// Rewrites `values` so each element holds its difference from the
/// previous one; the first element is kept absolute (relative to 0).
pub(crate) fn delta_encode(values: &mut [i64]) {
    let mut prev = 0_i64;
    for value in values.iter_mut() {
        let current = *value;
        *value = current - prev;
        prev = current;
    }
}

/// Delta-encodes while dropping `sentinel` elements, with the write cursor
/// lagging the read cursor. Equivalent to filtering the sentinels out
/// first, then delta-encoding.
pub(crate) fn delta_encode_clean(values: &mut Vec<i64>, sentinel: i64) {
    let mut prev = 0_i64;
    let mut target = 0_usize;

    for source in 0..values.len() {
        let current = values[source];
        if current == sentinel {
            continue;
        }

        values[target] = current - prev;
        prev = current;
        target += 1;
    }

    values.truncate(target);
}

/// Drops key/value pairs whose key id is 0 (tags interned from an empty
/// key). Both arrays move together; `keys` and `vals` must be parallel.
pub(crate) fn clean_tags(keys: &mut Vec<u32>, vals: &mut Vec<u32>) {
    let mut target = 0_usize;

    for source in 0..keys.len() {
        if keys[source] == 0 {
            continue;
        }

        keys[target] = keys[source];
        vals[target] = vals[source];
        target += 1;
    }

    keys.truncate(target);
    vals.truncate(target);
}

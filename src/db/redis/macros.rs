/// Read-through lookup: the cached value under `$key`, or the result of
/// awaiting `$fetch`, queued for caching with a `$ttl`-second lifetime.
///
/// Evaluates to an `AppResult`. A failed fetch is returned as is and nothing
/// is cached.
///
/// ```rust,ignore
/// let genres: AppResult<Vec<String>> =
///     cached!(self.cache, CacheKey::Genres(key), GENRE_CACHE_TTL, self.fetch_genres(&key));
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $fetch:expr) => {{
        let key = $key;
        match $cache.get_from_cache(&key).await {
            Ok(Some(hit)) => Ok(hit),
            _ => match $fetch.await {
                Ok(fresh) => {
                    $cache.set_in_background(&key, &fresh, $ttl);
                    Ok(fresh)
                }
                Err(e) => Err(e),
            },
        }
    }};
}

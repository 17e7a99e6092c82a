//! Exclusion filters.
//!
//! Vectors use the exclusion filter to drop code that belongs to well known third party SDKs
//! (support libraries, ads, analytics…), so that the findings point to the application's own
//! code. The filter holds no scan state: one instance can be shared by any number of scans.

use crate::apk::{CallSite, MethodRef, StringRead};

/// Packages excluded when the configuration does not give its own list.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "android.support",
    "androidx",
    "com.actionbarsherlock",
    "org.apache",
    "com.google.android.gms",
    "com.google.firebase",
    "com.facebook",
    "com.crashlytics",
    "com.flurry",
    "com.parse",
];

/// Name-based exclusion filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionFilter {
    prefixes: Vec<String>,
}

impl ExclusionFilter {
    /// Creates a filter from a list of class or package prefixes, in dotted or smali form.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prefixes: patterns
                .into_iter()
                .map(|p| normalize(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Gets the configured prefixes, normalized to dotted form.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Checks if the given qualified name matches any of the exclusion prefixes.
    ///
    /// A prefix matches whole name segments only: `com.facebook` excludes
    /// `com.facebook.ads.Ad`, but not `com.facebookclone.Main`.
    pub fn is_excluded<S: AsRef<str>>(&self, qualified_name: S) -> bool {
        let name = normalize(qualified_name.as_ref());
        self.prefixes.iter().any(|prefix| {
            name.starts_with(prefix.as_str())
                && name[prefix.len()..]
                    .chars()
                    .next()
                    .map_or(true, |c| c == '.' || c == '$')
        })
    }

    /// Keeps the class names that are not excluded.
    pub fn filter_classes<'a, S: AsRef<str>>(&self, classes: &'a [S]) -> Vec<&'a S> {
        retain(classes, |c| !self.is_excluded(c))
    }

    /// Keeps the methods whose class is not excluded.
    pub fn filter_methods<'a>(&self, methods: &'a [MethodRef]) -> Vec<&'a MethodRef> {
        retain(methods, |m| !self.is_excluded(&m.class_name))
    }

    /// Keeps the call paths whose calling class is not excluded.
    pub fn filter_paths<'a, 'i>(&self, paths: &'a [CallSite<'i>]) -> Vec<&'a CallSite<'i>> {
        retain(paths, |p| !self.is_excluded(&p.caller.class_name))
    }

    /// Keeps the variable references (string loads) made from classes that are not excluded.
    pub fn filter_variables<'a>(&self, variables: &'a [StringRead]) -> Vec<&'a StringRead> {
        retain(variables, |v| !self.is_excluded(&v.reader.class_name))
    }
}

fn retain<T, F: Fn(&T) -> bool>(elements: &[T], keep: F) -> Vec<&T> {
    elements.iter().filter(|e| keep(e)).collect()
}

/// Converts a smali type or package (`Lcom/facebook/ads/Ad;`, `Lcom/facebook/`) to its dotted
/// form.
fn normalize(name: &str) -> String {
    let name = name.trim();
    let name = if name.starts_with('L') && (name.contains('/') || name.ends_with(';')) {
        &name[1..]
    } else {
        name
    };
    name.trim_end_matches(';')
        .replace('/', ".")
        .trim_end_matches('.')
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::{ExclusionFilter, DEFAULT_EXCLUSIONS};
    use crate::apk::{CallSite, MethodRef, StringRead};

    #[test]
    fn it_is_excluded() {
        let filter = ExclusionFilter::new(&["com.facebook"]);
        assert!(filter.is_excluded("com.facebook.ads.Ad"));
        assert!(filter.is_excluded("com.facebook"));
        assert!(filter.is_excluded("Lcom/facebook/ads/Ad;"));
        assert!(!filter.is_excluded("com.example.App"));
        assert!(!filter.is_excluded("com.facebookclone.Main"));
    }

    #[test]
    fn it_normalizes_patterns() {
        let filter = ExclusionFilter::new(vec!["Landroid/support/", " org.apache. ", ""]);
        assert_eq!(filter.prefixes(), &["android.support", "org.apache"]);
        assert!(filter.is_excluded("android.support.v4.app.Fragment"));
        assert!(filter.is_excluded("org.apache.http.Client$Inner"));
        assert!(!filter.is_excluded("android.app.Activity"));
        assert!(!ExclusionFilter::default().is_excluded("com.facebook.ads.Ad"));
    }

    #[test]
    fn it_defaults() {
        let filter = ExclusionFilter::new(DEFAULT_EXCLUSIONS);
        assert!(filter.is_excluded("com.google.android.gms.ads.AdView"));
        assert!(!filter.is_excluded("com.google.example.Main"));
    }

    #[test]
    fn it_filter_collections() {
        let filter = ExclusionFilter::new(&["com.facebook", "androidx"]);

        let classes = ["com.example.A", "com.facebook.B", "com.example.C", "androidx.D"];
        assert_eq!(
            filter.filter_classes(&classes),
            vec![&"com.example.A", &"com.example.C"]
        );

        let own = MethodRef::new("com.example.Main", "run", "()V");
        let sdk = MethodRef::new("com.facebook.Sdk", "init", "()V");
        let target = MethodRef::new("android.content.pm.PackageManager", "getPackageInfo", "()V");
        let methods = vec![sdk.clone(), own.clone()];
        assert_eq!(filter.filter_methods(&methods), vec![&own]);

        let paths = vec![
            CallSite {
                caller: &sdk,
                callee: &target,
            },
            CallSite {
                caller: &own,
                callee: &target,
            },
        ];
        let kept = filter.filter_paths(&paths);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].caller, &own);

        let reads = vec![
            StringRead {
                reader: own.clone(),
                register: "v0".to_owned(),
            },
            StringRead {
                reader: sdk.clone(),
                register: "v1".to_owned(),
            },
            StringRead {
                reader: own.clone(),
                register: "v2".to_owned(),
            },
        ];
        let kept = filter.filter_variables(&reads);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].register, "v0");
        assert_eq!(kept[1].register, "v2");
    }
}

//! Bag-of-records classifier: the core of the engine. Pure function of a
//! bag plus an externally supplied adult-content regex.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::errors::{EmptyBag, MalformedRecord, Result};
use crate::pathlex;

/// One `(path, size)` pair. `path` is expected non-empty; `size` in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub path: String,
    pub size: u64,
}

/// The files of one torrent, in daemon-reported order.
pub type Bag = Vec<Record>;

/// Closed category enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Default,
    Av,
    Film,
    Tv,
    Music,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Default => "default",
            Category::Av => "av",
            Category::Film => "film",
            Category::Tv => "tv",
            Category::Music => "music",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed partition over lowercase extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtClass {
    VideoPrimary,
    VideoAccessory,
    Audio,
    DiscImage,
    Other,
}

const VIDEO_PRIMARY: &[&str] = &[
    "3gp", "3g2", "3gpp", "asf", "avi", "divx", "dpg", "evo", "flv", "f4v", "ifo", "k3g", "m1v",
    "m2v", "m4v", "mkv", "m4k", "mov", "mp2v", "m2ts", "m2t", "m4b", "m4p", "mp4", "mpeg", "mpg",
    "mpv", "mpv2", "mxf", "nsr", "nsv", "ogv", "ogm", "rm", "rmvb", "ram", "skm", "swf", "tp",
    "tpr", "ts", "vob", "webm", "wmv", "wmp", "wtv",
];

const VIDEO_ACCESSORY: &[&str] = &[
    "ass", "xss", "asx", "bdjo", "bdmv", "clpi", "idx", "mpl", "mpls", "psb", "rt", "sbv", "smi",
    "srr", "srt", "ssa", "ssf", "sub", "sup", "ttml", "usf", "vtt", "wmx", "wvx",
];

const AUDIO: &[&str] = &[
    "aac", "ac3", "aiff", "alac", "amr", "ape", "cda", "cue", "dsf", "dts", "dtshd", "eac3",
    "flac", "m3u", "m3u8", "m4a", "m1a", "m2a", "m4k", "ma", "mka", "mod", "mp2", "mp3", "mpc",
    "ogg", "opus", "pls", "rma", "tak", "tta", "wav", "wax", "wma", "wmv", "xspf",
];

/// Classify an extension. `iso` always reports `DiscImage`; the dual-use
/// software-vs-video decision is made by the caller, not here.
pub fn extension_class(ext: &str) -> ExtClass {
    if ext == "iso" {
        return ExtClass::DiscImage;
    }
    if VIDEO_PRIMARY.contains(&ext) {
        ExtClass::VideoPrimary
    } else if VIDEO_ACCESSORY.contains(&ext) {
        ExtClass::VideoAccessory
    } else if AUDIO.contains(&ext) {
        ExtClass::Audio
    } else {
        ExtClass::Other
    }
}

const SIZE_THRESH: u64 = 52_428_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TypeBucket {
    Film,
    Music,
    Default,
}

fn software_iso_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\b|_)(adobe|microsoft|windows|x64|x86|v\d+(\.\d+)+)(\b|_)")
            .expect("software-iso pattern is a fixed valid regex")
    })
}

fn tv_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(ep[\s_-]?\d{1,2}|s\d{1,2}e\d{1,2}|[se]\d{1,2})\b")
            .expect("tv marker pattern is a fixed valid regex")
    })
}

/// Build a `Bag` from raw `(path, size-as-string)` pairs, dropping any
/// record whose size does not parse as a non-negative integer. Returns the
/// bag plus one diagnostic string per dropped record.
pub fn normalize_bag<I>(raw: I) -> (Bag, Vec<String>)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut bag = Vec::new();
    let mut diagnostics = Vec::new();
    for (path, size_str) in raw {
        match size_str.trim().parse::<u64>() {
            Ok(size) => bag.push(Record { path, size }),
            Err(_) => {
                diagnostics.push(MalformedRecord(format!("{path}\0{size_str}")).to_string());
            }
        }
    }
    (bag, diagnostics)
}

/// Classify `bag` into one of the five categories given the adult-content
/// `av_regex`. `bag` must be non-empty.
pub fn classify(bag: &Bag, av_regex: &Regex) -> Result<Category> {
    if bag.is_empty() {
        return Err(EmptyBag.into());
    }

    let mut type_bucket: HashMap<TypeBucket, u64> = HashMap::new();
    let mut video_bucket: HashMap<String, u64> = HashMap::new();

    for record in bag {
        let path = pathlex::to_lower(&record.path);
        let (root, ext) = pathlex::split_ext(&path);
        let root = root.to_string();

        if ext == "iso" {
            if software_iso_regex().is_match(&root) {
                *type_bucket.entry(TypeBucket::Default).or_insert(0) += record.size;
            } else {
                *type_bucket.entry(TypeBucket::Film).or_insert(0) += record.size;
                *video_bucket.entry(path.clone()).or_insert(0) += record.size;
            }
            continue;
        }

        match extension_class(ext) {
            ExtClass::VideoPrimary => {
                let canon = pathlex::canonicalize(&root, ext);
                *video_bucket.entry(canon).or_insert(0) += record.size;
                *type_bucket.entry(TypeBucket::Film).or_insert(0) += record.size;
            }
            ExtClass::VideoAccessory => {
                *type_bucket.entry(TypeBucket::Film).or_insert(0) += record.size;
            }
            ExtClass::Audio => {
                *type_bucket.entry(TypeBucket::Music).or_insert(0) += record.size;
            }
            ExtClass::DiscImage | ExtClass::Other => {
                *type_bucket.entry(TypeBucket::Default).or_insert(0) += record.size;
            }
        }
    }

    match pick_dominant(&type_bucket) {
        TypeBucket::Music => Ok(Category::Music),
        TypeBucket::Default => Ok(Category::Default),
        TypeBucket::Film => Ok(refine_film(&video_bucket, av_regex)),
    }
}

/// Same as `classify`, but also builds the bag from raw string pairs and
/// surfaces the per-record parse diagnostics alongside the category.
pub fn classify_with_diagnostics<I>(raw: I, av_regex: &Regex) -> Result<(Category, Vec<String>)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let (bag, diagnostics) = normalize_bag(raw);
    let category = classify(&bag, av_regex)?;
    Ok((category, diagnostics))
}

fn pick_dominant(type_bucket: &HashMap<TypeBucket, u64>) -> TypeBucket {
    let film = *type_bucket.get(&TypeBucket::Film).unwrap_or(&0);
    let music = *type_bucket.get(&TypeBucket::Music).unwrap_or(&0);
    let default = *type_bucket.get(&TypeBucket::Default).unwrap_or(&0);

    if film >= music && film >= default {
        TypeBucket::Film
    } else if music >= default {
        TypeBucket::Music
    } else {
        TypeBucket::Default
    }
}

fn refine_film(video_bucket: &HashMap<String, u64>, av_regex: &Regex) -> Category {
    let mut video_list: Vec<(String, u64)> =
        video_bucket.iter().map(|(k, v)| (k.clone(), *v)).collect();
    if video_list.is_empty() {
        return Category::Film;
    }
    video_list.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let largest = video_list[0].1;
    let surviving: Vec<String> = if largest >= SIZE_THRESH {
        video_list
            .into_iter()
            .filter(|(_, size)| *size >= SIZE_THRESH)
            .map(|(path, _)| path)
            .collect()
    } else {
        video_list.into_iter().map(|(path, _)| path).collect()
    };

    let stripped = strip_common_prefix(&surviving);

    for path in &stripped {
        if av_regex.is_match(path) {
            return Category::Av;
        }
    }

    let marker = tv_marker_regex();
    for path in &stripped {
        if marker.is_match(path) {
            return Category::Tv;
        }
    }

    if stripped.len() >= 3 && consecutive_digit_groups(&stripped) {
        return Category::Tv;
    }

    Category::Film
}

/// Strip the longest directory-aligned common ancestor shared by every path
/// in `paths`. An ancestor never includes the final (filename) component.
fn strip_common_prefix(paths: &[String]) -> Vec<String> {
    let Some(prefix) = common_prefix(paths) else {
        return paths.to_vec();
    };
    let with_slash = format!("{prefix}/");
    paths
        .iter()
        .map(|p| p.strip_prefix(with_slash.as_str()).unwrap_or(p).to_string())
        .collect()
}

fn common_prefix(paths: &[String]) -> Option<String> {
    if paths.is_empty() {
        return None;
    }
    let split: Vec<Vec<&str>> = paths.iter().map(|p| p.split('/').collect()).collect();
    let min_len = split.iter().map(Vec::len).min().unwrap_or(0);
    let mut common = Vec::new();
    for i in 0..min_len.saturating_sub(1) {
        let candidate = split[0][i];
        if split.iter().all(|parts| parts[i] == candidate) {
            common.push(candidate);
        } else {
            break;
        }
    }
    if common.is_empty() {
        None
    } else {
        Some(common.join("/"))
    }
}

/// Splits `s` on maximal digit runs, returning `(words, nums)` where
/// `words.len() == nums.len() + 1`: `words[i]` precedes `nums[i]`.
fn split_digit_runs(s: &str) -> (Vec<String>, Vec<u64>) {
    let mut words = Vec::new();
    let mut nums = Vec::new();
    let mut word = String::new();
    let mut num = String::new();
    let mut in_digit = false;

    for c in s.chars() {
        if c.is_ascii_digit() {
            if !in_digit {
                words.push(std::mem::take(&mut word));
                in_digit = true;
            }
            num.push(c);
        } else {
            if in_digit {
                nums.push(num.parse().unwrap_or(0));
                num.clear();
                in_digit = false;
            }
            word.push(c);
        }
    }
    if in_digit {
        nums.push(num.parse().unwrap_or(0));
        words.push(String::new());
    } else {
        words.push(word);
    }
    (words, nums)
}

fn digit_run_key(word: &str) -> String {
    let tail = word.rfind('/').map_or(word, |idx| &word[idx + 1..]);
    tail.chars()
        .filter(|c| !c.is_whitespace() && !c.is_control() && !matches!(c, '.' | '_' | '-'))
        .collect()
}

/// Fires true the moment any `(split-index, cleaned-word)` group collects
/// three or more distinct digit-run values across `paths`.
fn consecutive_digit_groups(paths: &[String]) -> bool {
    let mut groups: HashMap<(usize, String), HashSet<u64>> = HashMap::new();
    for path in paths {
        let (words, nums) = split_digit_runs(path);
        for (i, &n) in nums.iter().enumerate() {
            let key = digit_run_key(&words[i]);
            let set = groups.entry((i, key)).or_default();
            set.insert(n);
            if set.len() >= 3 {
                return true;
            }
        }
    }
    false
}

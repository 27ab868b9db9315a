const VERSION_WITH_GIT: &str = concat!(
    env!("TELEXEC_VERSION_LABEL"),
    " (git ",
    env!("TELEXEC_GIT_SHA"),
    ", built ",
    env!("TELEXEC_BUILD_TIME"),
    ")",
);
const VERSION_NO_GIT: &str = concat!(
    env!("TELEXEC_VERSION_LABEL"),
    " (built ",
    env!("TELEXEC_BUILD_TIME"),
    ")",
);

pub const VERSION: &str = if env!("TELEXEC_GIT_SHA").is_empty() {
    VERSION_NO_GIT
} else {
    VERSION_WITH_GIT
};

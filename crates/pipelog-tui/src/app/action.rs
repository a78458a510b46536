use pipelog_types::LogLevel;

/// Everything the viewer can be asked to do (command pattern)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Quit,

    // Scrolling
    ScrollUp(usize),
    ScrollDown(usize),
    ScrollToTop,
    ScrollToBottom,
    PageUp,
    PageDown,
    ToggleFollow,

    // Level mask
    ToggleLevel(LogLevel),
    ShowAllLevels,

    // Sink
    ClearLogs,
    ExportLogs,

    // Text filter
    OpenSearch,
    CloseSearch,
    SearchInput(char),
    SearchBackspace,
    SearchClear,
    ApplyFilter,
    ClearFilter,
    ToggleCaseSensitive,

    // Display toggles
    ToggleTimestamps,
    ToggleSource,
    ToggleStats,
    ToggleHelp,

    DismissMessage,
}

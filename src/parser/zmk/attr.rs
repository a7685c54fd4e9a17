use crate::{
    ast::{
        attr::{CLASS_KEY, DASH_KEY, DEFAULT_KEY},
        Attributes,
    },
    input::{is_space, Input, EOS},
};

/// Parses `{...}` at the current position.
///
/// With `fence` set, a leading bare name becomes the default value. On failure the position is
/// restored and `None` is returned.
pub(crate) fn parse_attributes(inp: &mut Input, fence: bool) -> Option<Attributes> {
    if inp.ch() != '{' {
        return None;
    }
    let start = inp.pos;
    inp.next();
    match parse_items(inp, fence) {
        Some(attrs) => Some(attrs),
        None => {
            inp.pos = start;
            None
        }
    }
}

fn parse_items(inp: &mut Input, fence: bool) -> Option<Attributes> {
    let mut attrs = Attributes::new();
    let mut first = true;
    loop {
        skip_ws(inp);
        match inp.ch() {
            EOS => return None,
            '}' => {
                inp.next();
                return Some(attrs);
            }
            '.' => {
                inp.next();
                let class = scan_bare(inp);
                if class.is_empty() {
                    return None;
                }
                attrs.add_class(&class);
            }
            '=' => {
                inp.next();
                let value = scan_value(inp)?;
                attrs.set(DEFAULT_KEY, value);
            }
            ch if is_name_char(ch) => {
                let name = scan_name(inp);
                if inp.ch() == '=' {
                    inp.next();
                    let value = scan_value(inp)?;
                    if name == CLASS_KEY {
                        for class in value.split_whitespace() {
                            attrs.add_class(class);
                        }
                    } else {
                        attrs.set(name, value);
                    }
                } else if name == DASH_KEY {
                    attrs.set(DASH_KEY, "");
                } else if fence && first && !attrs.has(DEFAULT_KEY) {
                    attrs.set(DEFAULT_KEY, name);
                } else {
                    attrs.set(name, "");
                }
            }
            _ => return None,
        }
        first = false;
        if !matches!(inp.ch(), '}' | ' ' | '\t' | '\n') {
            return None;
        }
    }
}

fn skip_ws(inp: &mut Input) {
    while is_space(inp.ch()) || inp.ch() == '\n' {
        inp.next();
    }
}

pub(crate) fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '-' || ch == '_'
}

fn scan_name(inp: &mut Input) -> String {
    let mut name = String::new();
    while is_name_char(inp.ch()) {
        name.push(inp.ch());
        inp.next();
    }
    name
}

fn scan_bare(inp: &mut Input) -> String {
    let mut s = String::new();
    loop {
        let ch = inp.ch();
        if ch == EOS || ch == '}' || ch == '"' || ch == '=' || is_space(ch) || ch == '\n' {
            return s;
        }
        s.push(ch);
        inp.next();
    }
}

fn scan_value(inp: &mut Input) -> Option<String> {
    if inp.ch() != '"' {
        return Some(scan_bare(inp));
    }
    inp.next();
    let mut s = String::new();
    loop {
        match inp.ch() {
            EOS => return None,
            '"' => {
                inp.next();
                return Some(s);
            }
            '\\' => {
                let esc = inp.next();
                if esc == EOS {
                    return None;
                }
                s.push(esc);
                inp.next();
            }
            ch => {
                s.push(ch);
                inp.next();
            }
        }
    }
}

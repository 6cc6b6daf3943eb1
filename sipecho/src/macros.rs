macro_rules! lookup_table {
    ($name:ident => $( $slice:expr ),+) => {
        const $name: [bool; 256] = {
            let mut arr = [false; 256];
            $(
                let mut i = 0;
                while i < $slice.len() {
                    arr[$slice[i] as usize] = true;
                    i += 1;
                }
            )*
            arr
        };
    };
}

macro_rules! parse_header_param {
    ($parser:ident) => (
        $crate::macros::parse_param!(
            $parser,
            $crate::parser::Parser::parse_param,
        )
    );

    ($parser:ident, $($name:ident = $var:expr),*) => (
        $crate::macros::parse_param!(
            $parser,
            $crate::parser::Parser::parse_param,
            $($name = $var),*
        )
    );
}

macro_rules! parse_param {
    (
        $parser:ident,
        $func:expr,
        $($name:ident = $var:expr),*
    ) =>  {{
        $parser.skip_ws();
        match $parser.peek() {
            Some(b';') => {
                let mut params = $crate::message::Params::new();
                while let Some(b';') = $parser.peek() {
                    // take ';' character
                    $parser.advance();
                    let param = $func($parser)?;
                    $(
                        if param.name.eq_ignore_ascii_case($name) {
                            $var = param.value;
                            $parser.skip_ws();
                            continue;
                        }
                    )*
                    params.push(param);
                    $parser.skip_ws();
                }
                if params.is_empty() {
                    None
                } else {
                    Some(params)
                }
            },
            _ => {
                None
            }
        }
    }};
}

macro_rules! hdr_list {
    ($parser:ident => $body:expr) => {{
        let mut hdr_items = Vec::with_capacity(1);
        $crate::macros::comma_separated!($parser => {
            hdr_items.push($body);
        });
        hdr_items
    }};
}

macro_rules! comma_separated {
    ($parser:ident => $body:expr) => {{
        $parser.skip_ws();
        $body

        while let Some(b',') = $parser.peek() {
            $parser.advance();
            $parser.skip_ws();
            $body
        }
    }};
}

/// Creates a [`Headers`](crate::headers::Headers) collection
/// from a list of headers.
#[macro_export]
macro_rules! headers {
    () => (
        $crate::headers::Headers::new()
    );
    ($($x:expr),+ $(,)?) => (
        $crate::headers::Headers::from(vec![$($x),+])
    );
}

/// Returns an iterator over all headers of the given variant.
#[macro_export]
macro_rules! filter_map_header {
    ($hdrs:expr, $header:ident) => {
        $hdrs.iter().filter_map(|hdr| {
            if let $crate::headers::Header::$header(v) = hdr {
                Some(v)
            } else {
                None
            }
        })
    };
}

/// Finds the first header of the given variant.
#[macro_export]
macro_rules! find_map_header {
    ($hdrs:expr, $header:ident) => {
        $hdrs.iter().find_map(|hdr| {
            if let $crate::headers::Header::$header(v) = hdr {
                Some(v)
            } else {
                None
            }
        })
    };
}

/// Finds the first header of the given variant, mutably.
#[macro_export]
macro_rules! find_map_mut_header {
    ($hdrs:expr, $header:ident) => {
        $hdrs.iter_mut().find_map(|hdr| {
            if let $crate::headers::Header::$header(v) = hdr {
                Some(v)
            } else {
                None
            }
        })
    };
}

pub(crate) use comma_separated;
pub(crate) use hdr_list;
pub(crate) use lookup_table;
pub(crate) use parse_header_param;
pub(crate) use parse_param;

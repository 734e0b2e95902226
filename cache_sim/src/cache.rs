use std::collections::VecDeque;
use std::fmt;

use thiserror::Error;

use crate::{
    common::Word,
    memory::{Addr, Memory, MemoryAccessError},
    trace::{Direction, TraceEvent, TraceSink},
};

/// upper bound on `num_sets * ways_per_set` for one cache.
pub const MAX_CACHE_BLOCKS: usize = 256usize;

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub block_size_words: usize,
    pub num_sets: usize,
    pub ways_per_set: usize,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("block size must be a non-zero power of two, found {0}")]
    BlockSize(usize),
    #[error("set count must be a non-zero power of two, found {0}")]
    NumSets(usize),
    #[error("a set needs at least one way")]
    NoWays,
    #[error("{blocks} blocks configured, at most {MAX_CACHE_BLOCKS} supported")]
    TooManyBlocks { blocks: usize },
}

impl CacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size_words == 0 || !self.block_size_words.is_power_of_two() {
            return Err(ConfigError::BlockSize(self.block_size_words));
        }
        if self.num_sets == 0 || !self.num_sets.is_power_of_two() {
            return Err(ConfigError::NumSets(self.num_sets));
        }
        if self.ways_per_set == 0 {
            return Err(ConfigError::NoWays);
        }
        let blocks = self.num_sets * self.ways_per_set;
        if blocks > MAX_CACHE_BLOCKS {
            return Err(ConfigError::TooManyBlocks { blocks });
        }
        Ok(())
    }
}

/// splits a word address into tag, set index and block offset.
#[derive(Debug, Clone, Copy)]
pub struct AddressDecoder {
    block_bits: u32,
    set_bits: u32,
}

pub struct AddressParts {
    pub tag: usize,
    pub set_index: usize,
    pub offset: usize,
}

impl AddressDecoder {
    pub fn new(config: &CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            block_bits: config.block_size_words.trailing_zeros(),
            set_bits: config.num_sets.trailing_zeros(),
        })
    }

    pub fn split(&self, addr: Addr) -> AddressParts {
        let a = addr.inner();
        AddressParts {
            offset: a & ((1 << self.block_bits) - 1),
            set_index: (a >> self.block_bits) & ((1 << self.set_bits) - 1),
            tag: a >> (self.block_bits + self.set_bits),
        }
    }

    /// base address of the line containing `addr`.
    pub fn line_base(&self, addr: Addr) -> Addr {
        Addr::new((addr.inner() >> self.block_bits) << self.block_bits)
    }

    /// reconstructs the base address a resident line was filled from.
    pub fn rebuild_base(&self, tag: usize, set_index: usize) -> Addr {
        Addr::new((tag << (self.set_bits + self.block_bits)) | (set_index << self.block_bits))
    }
}

/// one way of a set. a block is valid exactly when it holds a tag.
struct Block {
    tag: Option<usize>,
    dirty: bool,
    data: Box<[Word]>,
}

impl Block {
    fn new(block_size_words: usize) -> Self {
        Self {
            tag: None,
            dirty: false,
            data: vec![0; block_size_words].into_boxed_slice(),
        }
    }

    fn is_valid(&self) -> bool {
        self.tag.is_some()
    }
}

/// the ways sharing one set index, plus their recency order.
struct CacheSet {
    ways: Vec<Block>,
    /// way indices of valid ways, most recently used first.
    recency: VecDeque<usize>,
}

impl CacheSet {
    fn new(ways_per_set: usize, block_size_words: usize) -> Self {
        Self {
            ways: (0..ways_per_set)
                .map(|_| Block::new(block_size_words))
                .collect(),
            recency: VecDeque::with_capacity(ways_per_set),
        }
    }

    /// way currently holding `tag`, if any. only a valid way can match.
    fn lookup(&self, tag: usize) -> Option<usize> {
        self.ways.iter().position(|b| b.tag == Some(tag))
    }

    /// moves `way` to the most-recent position.
    fn touch(&mut self, way: usize) {
        self.recency.retain(|&w| w != way);
        self.recency.push_front(way);
    }

    /// way to receive an incoming line: an invalid way if one exists
    /// (lowest index first), otherwise the least recently used valid way.
    fn victim(&self, set_index: usize) -> usize {
        if let Some(way) = self.ways.iter().position(|b| !b.is_valid()) {
            return way;
        }
        *self
            .recency
            .back()
            .unwrap_or_else(|| panic!("set {set_index} is full but has no recency order"))
    }
}

/// hit/miss counters. observational only.
#[derive(Default, Clone, Copy)]
pub struct CacheStat {
    hits: usize,
    misses: usize,
}

impl CacheStat {
    fn hit(&mut self) {
        self.hits += 1;
    }
    fn miss(&mut self) {
        self.misses += 1;
    }
    pub fn hits(&self) -> usize {
        self.hits
    }
    pub fn misses(&self) -> usize {
        self.misses
    }
}

impl fmt::Display for CacheStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.hits + self.misses;
        if total == 0 {
            return write!(f, "no accesses");
        }
        let hit_pct = 100. * self.hits as f64 / total as f64;
        write!(
            f,
            "hit: {} ({:.2}%), miss: {} ({:.2}%)",
            self.hits,
            hit_pct,
            self.misses,
            100. - hit_pct
        )
    }
}

/// set-associative write-allocate write-back cache in front of a [`Memory`].
pub struct Cache {
    config: CacheConfig,
    decoder: AddressDecoder,
    sets: Vec<CacheSet>,
    stat: CacheStat,
}

impl Cache {
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        let decoder = AddressDecoder::new(&config)?;
        let sets = (0..config.num_sets)
            .map(|_| CacheSet::new(config.ways_per_set, config.block_size_words))
            .collect();
        Ok(Self {
            config,
            decoder,
            sets,
            stat: CacheStat::default(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stat(&self) -> CacheStat {
        self.stat
    }

    /// services one processor load. a miss allocates the line, evicting
    /// (and writing back a dirty resident) first.
    pub fn read<const WORDS: usize>(
        &mut self,
        mem: &mut Memory<WORDS>,
        addr: Addr,
        trace: &mut impl TraceSink,
    ) -> Result<Word, MemoryAccessError> {
        mem.check(addr)?;
        let parts = self.decoder.split(addr);
        let way = self.access_line(mem, addr, &parts, trace)?;
        let word = self.sets[parts.set_index].ways[way].data[parts.offset];
        trace.emit(TraceEvent::new(addr, 1, Direction::CacheToProcessor));
        Ok(word)
    }

    /// services one processor store. write-allocate: a miss loads the line
    /// first, then the word is stored and the block marked dirty.
    pub fn write<const WORDS: usize>(
        &mut self,
        mem: &mut Memory<WORDS>,
        addr: Addr,
        word: Word,
        trace: &mut impl TraceSink,
    ) -> Result<(), MemoryAccessError> {
        mem.check(addr)?;
        let parts = self.decoder.split(addr);
        let way = self.access_line(mem, addr, &parts, trace)?;
        let block = &mut self.sets[parts.set_index].ways[way];
        block.data[parts.offset] = word;
        block.dirty = true;
        trace.emit(TraceEvent::new(addr, 1, Direction::ProcessorToCache));
        Ok(())
    }

    /// makes the line containing `addr` resident and most recent,
    /// returning the way it occupies.
    fn access_line<const WORDS: usize>(
        &mut self,
        mem: &mut Memory<WORDS>,
        addr: Addr,
        parts: &AddressParts,
        trace: &mut impl TraceSink,
    ) -> Result<usize, MemoryAccessError> {
        if let Some(way) = self.sets[parts.set_index].lookup(parts.tag) {
            self.stat.hit();
            self.sets[parts.set_index].touch(way);
            return Ok(way);
        }
        self.stat.miss();

        let way = self.sets[parts.set_index].victim(parts.set_index);
        self.evict(mem, parts.set_index, way, trace)?;

        let base = self.decoder.line_base(addr);
        let block_words = self.config.block_size_words;
        let set = &mut self.sets[parts.set_index];
        let block = &mut set.ways[way];
        mem.read_line(base, &mut block.data)?;
        block.tag = Some(parts.tag);
        block.dirty = false;
        set.touch(way);
        trace.emit(TraceEvent::new(base, block_words, Direction::MemoryToCache));
        Ok(way)
    }

    /// discards the current resident of `way`, writing it back first when
    /// dirty. an invalid way has nothing to discard and emits no event.
    fn evict<const WORDS: usize>(
        &mut self,
        mem: &mut Memory<WORDS>,
        set_index: usize,
        way: usize,
        trace: &mut impl TraceSink,
    ) -> Result<(), MemoryAccessError> {
        let decoder = self.decoder;
        let block_words = self.config.block_size_words;
        let block = &mut self.sets[set_index].ways[way];
        let Some(tag) = block.tag else {
            return Ok(());
        };
        let base = decoder.rebuild_base(tag, set_index);
        if block.dirty {
            mem.write_line(base, &block.data)?;
            block.dirty = false;
            trace.emit(TraceEvent::new(base, block_words, Direction::CacheToMemory));
        } else {
            trace.emit(TraceEvent::new(base, block_words, Direction::CacheToNowhere));
        }
        block.tag = None;
        Ok(())
    }
}
